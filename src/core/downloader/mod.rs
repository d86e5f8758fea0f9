pub mod client;

pub use client::{DownloadEntry, DownloadProgress, Downloader};
