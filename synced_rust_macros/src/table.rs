use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, LitStr};

pub fn derive_table(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let table = match extract_table(&input) {
        Ok(table) => table,
        Err(err) => return err.to_compile_error().into(),
    };

    let expanded = quote! {
        impl #impl_generics synced_rust::Table for #name #ty_generics #where_clause {
            const TABLE: &'static str = #table;
        }
    };

    TokenStream::from(expanded)
}

fn extract_table(input: &DeriveInput) -> syn::Result<String> {
    for attr in &input.attrs {
        if !attr.path().is_ident("table") {
            continue;
        }

        let mut table = None;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                if value.value().is_empty() {
                    return Err(meta.error("table name must not be empty"));
                }
                table = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported table attribute, expected `name = \"...\"`"))
            }
        })?;

        if let Some(t) = table {
            return Ok(t);
        }
    }

    // Default: snake_case struct name + "s"
    Ok(format!("{}s", to_snake_case(&input.ident.to_string())))
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(ch.to_lowercase());
        } else {
            result.push(ch);
        }
    }
    result
}
