use quote::ToTokens;
use std::collections::HashSet;
use syn::{Attribute, Path, Token, punctuated::Punctuated};

/// 将 attrs 中已有的 `#[derive(...)]` 与 required 合并为一条 derive，
/// 其余属性原样保留在其后
pub(crate) fn apply_derives(attrs: &mut Vec<Attribute>, required: Vec<Path>) {
    let (retained, existing) = split_derives(attrs);
    let merged = merge_derives(required, existing);
    *attrs = std::iter::once(merged).chain(retained).collect();
}

fn split_derives(attrs: &[Attribute]) -> (Vec<Attribute>, Vec<Path>) {
    let mut retained = Vec::new();
    let mut existing = Vec::new();
    for attr in attrs {
        if !attr.path().is_ident("derive") {
            retained.push(attr.clone());
            continue;
        }
        match attr.parse_args_with(Punctuated::<Path, Token![,]>::parse_terminated) {
            Ok(list) => existing.extend(list),
            // 无法解析的 derive 交给编译器报错
            Err(_) => retained.push(attr.clone()),
        }
    }
    (retained, existing)
}

fn merge_derives(required: Vec<Path>, existing: Vec<Path>) -> Attribute {
    let mut seen = HashSet::new();
    let list: Vec<Path> = required
        .into_iter()
        .chain(existing)
        .filter(|p| seen.insert(derive_key(p)))
        .collect();
    syn::parse_quote!(#[derive(#(#list),*)])
}

// Serialize 与 serde::Serialize 视为同一派生
fn derive_key(p: &Path) -> String {
    match p.segments.last() {
        Some(last) => match last.ident.to_string().as_str() {
            name @ ("Serialize" | "Deserialize") => format!("serde::{name}"),
            name => name.to_string(),
        },
        None => p.to_token_stream().to_string(),
    }
}
