//! Derive macros for the `micro` crate.
//!
//! - `#[derive(BinaryCodec)]` implements the crate's `Encode`/`Decode` traits
//!   for structs with named fields (used by the program file container).
//! - `#[derive(Error)]` implements `Display` and `std::error::Error` for
//!   error enums from `#[error("...")]` attributes.

mod binary_codec;
mod error;

use proc_macro::TokenStream;

/// Implements `Encode` and `Decode` by serializing named fields in declaration order.
#[proc_macro_derive(BinaryCodec)]
pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    binary_codec::derive_binary_codec(input)
}

/// Implements `Display` and `Error` for an error enum.
#[proc_macro_derive(Error, attributes(error))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
