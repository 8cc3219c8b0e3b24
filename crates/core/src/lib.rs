//! Core building blocks for `cblcache`.
//!
//! Everything in this crate is free of I/O: the error taxonomy, the key
//! composer, the value codec, the server-side script sources and the
//! [`Store`](cache::Store) trait that concrete backends implement.

pub mod cache;
