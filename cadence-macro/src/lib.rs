/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */
#![forbid(unsafe_code)]

//! Cadence Macro Library
//!
//! Procedural macros for the Cadence kernel.
//!
//! # Token Macro
//!
//! [`cadence_token`] prepares a type to travel through receivers as a token payload:
//!
//! ```ignore
//! #[cadence_token]
//! pub struct Sample {
//!     pub value: f64,
//! }
//! ```
//!
//! # Actor Macro
//!
//! [`cadence_actor`] prepares a type to be used as the state of an atomic actor:
//!
//! ```ignore
//! #[cadence_actor]
//! pub struct Accumulator {
//!     total: f64,
//! }
//! ```

use proc_macro::TokenStream;

use quote::quote;
use syn::{parse_macro_input, DeriveInput};

fn has_derive(input: &DeriveInput, trait_name: &str) -> bool {
    input.attrs.iter().any(|attr| {
        if attr.path().is_ident("derive") {
            let mut found = false;
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident(trait_name) {
                    found = true;
                }
                Ok(())
            });
            found
        } else {
            false
        }
    })
}

/// Options parsed from `#[cadence_actor(...)]`.
#[derive(Default)]
struct ActorOptions {
    /// Skip deriving Default (the user implements it).
    no_default: bool,
}

impl ActorOptions {
    fn parse(attr: &TokenStream) -> Self {
        let mut options = Self::default();
        for part in attr.to_string().split(',') {
            if part.trim() == "no_default" {
                options.no_default = true;
            }
        }
        options
    }
}

/// Prepares a type for use as a token payload.
///
/// Tokens are shared between actors running on different tasks, so the payload
/// must be `Send + Sync + 'static`. The macro:
/// - adds `#[derive(Clone, Debug)]` for whichever of the two is missing
/// - emits a compile-time assertion of the `Send + Sync + 'static` bounds
///
/// ```ignore
/// use cadence_macro::cadence_token;
///
/// #[cadence_token]
/// pub struct Reading {
///     pub celsius: f64,
/// }
/// ```
#[proc_macro_attribute]
pub fn cadence_token(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);

    let name = &input.ident;
    let generics = &input.generics;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let mut traits = Vec::new();
    if !has_derive(&input, "Clone") {
        traits.push(quote!(Clone));
    }
    if !has_derive(&input, "Debug") {
        traits.push(quote!(Debug));
    }
    let derives = if traits.is_empty() {
        quote!()
    } else {
        quote!(#[derive(#(#traits),*)])
    };

    let assert_ident = quote::format_ident!("_AssertCadenceToken_{}", name);

    let expanded = quote! {
        #derives
        #input

        #[doc(hidden)]
        #[allow(dead_code, non_camel_case_types, non_snake_case, clippy::needless_lifetimes)]
        const _: () = {
            fn #assert_ident #impl_generics () #where_clause {
                fn assert_bounds<T: Send + Sync + 'static>() {}
                assert_bounds::<#name #ty_generics>();
            }
        };
    };

    TokenStream::from(expanded)
}

/// Prepares a type for use as the state of an atomic actor.
///
/// Each atomic actor is moved onto whatever task its director chooses, so the
/// state type must be `Send + 'static`; the kernel also logs actors with `Debug`.
/// The macro:
/// - adds `#[derive(Default, Debug)]` for whichever is missing
/// - emits a compile-time assertion of the `Send + 'static` bounds
///
/// # Options
///
/// `no_default` skips the `Default` derive when the state needs a hand-written one:
///
/// ```ignore
/// #[cadence_actor(no_default)]
/// struct Ramp {
///     step: f64,
/// }
///
/// impl Default for Ramp {
///     fn default() -> Self {
///         Self { step: 1.0 }
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn cadence_actor(attr: TokenStream, item: TokenStream) -> TokenStream {
    let options = ActorOptions::parse(&attr);
    let input = parse_macro_input!(item as DeriveInput);

    let name = &input.ident;
    let generics = &input.generics;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let mut traits = Vec::new();
    if !options.no_default && !has_derive(&input, "Default") {
        traits.push(quote!(Default));
    }
    if !has_derive(&input, "Debug") {
        traits.push(quote!(Debug));
    }
    let derives = if traits.is_empty() {
        quote!()
    } else {
        quote!(#[derive(#(#traits),*)])
    };

    let assert_ident = quote::format_ident!("_AssertCadenceActor_{}", name);

    let expanded = quote! {
        #derives
        #input

        #[doc(hidden)]
        #[allow(dead_code, non_camel_case_types, non_snake_case, clippy::needless_lifetimes)]
        const _: () = {
            fn #assert_ident #impl_generics () #where_clause {
                fn assert_bounds<T: Send + 'static>() {}
                assert_bounds::<#name #ty_generics>();
            }
        };
    };

    TokenStream::from(expanded)
}
