//! Code generation modules for entities and collections
//!
//! Every module turns one aspect of a [`Table`](crate::table::Table) into
//! token streams; the [`Generator`](crate::generator::Generator) decides the
//! order in which they are written.

pub mod collection;
pub mod column;
pub mod dbm;
pub mod emitter;
pub mod entity;
pub mod relation;
pub mod test_code;

use proc_macro2::TokenStream;
use quote::quote;

/// `#[doc]` attributes for `text`, wrapped at 76 columns
pub(crate) fn doc(text: &str) -> TokenStream {
    let lines = emitter::wrap_comment(text.trim(), 76)
        .into_iter()
        .map(|l| if l.is_empty() { l } else { format!(" {}", l) });
    quote! { #(#[doc = #lines])* }
}

/// `#[derive]` attributes shared by entities and collections
pub(crate) fn derives(serde: bool) -> TokenStream {
    if serde {
        quote! {
            #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
            #[serde(default)]
        }
    } else {
        quote! { #[derive(Debug, Clone, Default, PartialEq)] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_attrs() {
        let ts = doc("first\n\nsecond");
        assert_eq!(
            ts.to_string(),
            quote!(#[doc = " first"] #[doc = ""] #[doc = " second"]).to_string()
        );
    }
}
