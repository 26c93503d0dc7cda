pub mod client;

pub use client::HttpSink;
