//! Infrastructure helpers shared by every adapter: the ASCII hex codec
//! used to render reply lines and parse request strings.
pub mod hex;
