use crate::utils::apply_derives;
use proc_macro::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{Item, LitStr, Result, Token, parse::Parse, parse::ParseStream, parse_macro_input};

pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as EventPayloadAttrConfig);
    let mut input = parse_macro_input!(item as Item);

    let required: Vec<syn::Path> = vec![
        syn::parse_quote!(Debug),
        syn::parse_quote!(Clone),
        syn::parse_quote!(serde::Serialize),
        syn::parse_quote!(serde::Deserialize),
    ];

    let (ident, generics) = match &mut input {
        Item::Struct(st) => {
            apply_derives(&mut st.attrs, required);
            (st.ident.clone(), st.generics.clone())
        }
        Item::Enum(en) => {
            apply_derives(&mut en.attrs, required);
            (en.ident.clone(), en.generics.clone())
        }
        other => {
            return syn::Error::new(other.span(), "#[event_payload] only supports struct or enum")
                .to_compile_error()
                .into();
        }
    };

    if !generics.params.is_empty() {
        return syn::Error::new(generics.span(), "#[event_payload] does not support generics")
            .to_compile_error()
            .into();
    }

    let event_type = cfg
        .event_type
        .unwrap_or_else(|| LitStr::new(&ident.to_string(), ident.span()));

    // 未指定分类时沿用 trait 的默认常量
    let category = cfg.category.map(|lit| {
        quote! { const CATEGORY: &'static str = #lit; }
    });

    let out = quote! {
        #input

        impl ::pulse_engine::event::EventPayload for #ident {
            const EVENT_TYPE: &'static str = #event_type;
            #category
        }
    };

    TokenStream::from(out)
}

// -------- parsing --------

struct EventPayloadAttrConfig {
    event_type: Option<LitStr>,
    category: Option<LitStr>,
}

impl Parse for EventPayloadAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut event_type: Option<LitStr> = None;
        let mut category: Option<LitStr> = None;

        if input.is_empty() {
            return Ok(Self {
                event_type,
                category,
            });
        }

        let pairs: Punctuated<AttrKv, Token![,]> = Punctuated::parse_terminated(input)?;

        for kv in pairs {
            let slot = match kv.key.to_string().as_str() {
                "event_type" => &mut event_type,
                "category" => &mut category,
                _ => {
                    return Err(syn::Error::new(
                        kv.key.span(),
                        "unknown key; expected 'event_type' | 'category'",
                    ));
                }
            };
            if slot.is_some() {
                return Err(syn::Error::new(
                    kv.key.span(),
                    format!("duplicate key '{}' in attribute", kv.key),
                ));
            }
            if kv.value.value().is_empty() {
                return Err(syn::Error::new(
                    kv.value.span(),
                    format!("'{}' must not be empty", kv.key),
                ));
            }
            *slot = Some(kv.value);
        }

        Ok(Self {
            event_type,
            category,
        })
    }
}

struct AttrKv {
    key: syn::Ident,
    value: LitStr,
}

impl Parse for AttrKv {
    fn parse(input: ParseStream) -> Result<Self> {
        let key: syn::Ident = input.parse()?;
        let _eq: Token![=] = input.parse()?;
        let expr: syn::Expr = input.parse()?;
        match expr {
            syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Str(value),
                ..
            }) => Ok(Self { key, value }),
            other => Err(syn::Error::new(
                other.span(),
                format!("expected string literal for '{}'", key),
            )),
        }
    }
}
