//! Derive macro for `restkit::ResourceSchema`.
//!
//! Reads the struct's named fields together with the serde attributes that
//! influence serialized keys (`rename`, `rename_all`, `skip`,
//! `skip_serializing`, `flatten`) and emits a static descriptor table.

use heck::{ToKebabCase, ToLowerCamelCase, ToShoutyKebabCase, ToShoutySnakeCase, ToUpperCamelCase};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, GenericArgument, PathArguments, Type};

#[proc_macro_derive(ResourceSchema, attributes(serde))]
pub fn derive_resource_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input.ident,
                    "ResourceSchema can only be derived for structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "ResourceSchema can only be derived for structs",
            ))
        }
    };

    let container = SerdeAttrs::parse(&input.attrs)?;
    let rename_all = container.rename_all.as_deref().map(RenameRule::parse).transpose()?;

    let mut descriptors = Vec::new();
    for field in fields {
        let attrs = SerdeAttrs::parse(&field.attrs)?;
        if attrs.skip || attrs.flatten {
            continue;
        }
        let Some(ident) = &field.ident else { continue };
        let name = ident.to_string().trim_start_matches("r#").to_string();
        let key = match (&attrs.rename, rename_all) {
            (Some(explicit), _) => explicit.clone(),
            (None, Some(rule)) => rule.apply(&name),
            (None, None) => name.clone(),
        };
        let kind = classify(&field.ty);
        descriptors.push(quote! {
            ::restkit::FieldSchema::new(#name, #key, ::restkit::FieldType::#kind)
        });
    }

    let ident = &input.ident;
    let type_name = ident.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::restkit::ResourceSchema for #ident #ty_generics #where_clause {
            fn schema() -> ::restkit::Schema {
                ::restkit::Schema::Struct(::restkit::StructSchema::new(
                    #type_name,
                    ::std::vec![#(#descriptors),*],
                ))
            }
        }
    })
}

#[derive(Default)]
struct SerdeAttrs {
    rename: Option<String>,
    rename_all: Option<String>,
    skip: bool,
    flatten: bool,
}

impl SerdeAttrs {
    fn parse(attrs: &[syn::Attribute]) -> syn::Result<Self> {
        let mut out = SerdeAttrs::default();
        for attr in attrs.iter().filter(|a| a.path().is_ident("serde")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") || meta.path.is_ident("rename_all") {
                    let target = if meta.path.is_ident("rename") {
                        &mut out.rename
                    } else {
                        &mut out.rename_all
                    };
                    if meta.input.peek(syn::Token![=]) {
                        let lit: syn::LitStr = meta.value()?.parse()?;
                        *target = Some(lit.value());
                    } else {
                        // rename(serialize = "..", deserialize = "..")
                        meta.parse_nested_meta(|inner| {
                            let lit: syn::LitStr = inner.value()?.parse()?;
                            if inner.path.is_ident("serialize") {
                                *target = Some(lit.value());
                            }
                            Ok(())
                        })?;
                    }
                    return Ok(());
                }
                if meta.path.is_ident("skip") || meta.path.is_ident("skip_serializing") {
                    out.skip = true;
                    return Ok(());
                }
                if meta.path.is_ident("flatten") {
                    out.flatten = true;
                    return Ok(());
                }
                skip_meta_value(&meta)
            })?;
        }
        Ok(out)
    }
}

/// Consume whatever follows an attribute key we do not care about.
fn skip_meta_value(meta: &syn::meta::ParseNestedMeta<'_>) -> syn::Result<()> {
    if meta.input.peek(syn::Token![=]) {
        meta.value()?.parse::<syn::Expr>()?;
    } else if meta.input.peek(syn::token::Paren) {
        let content;
        syn::parenthesized!(content in meta.input);
        content.parse::<TokenStream2>()?;
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum RenameRule {
    Lower,
    Upper,
    Pascal,
    Camel,
    Snake,
    ScreamingSnake,
    Kebab,
    ScreamingKebab,
}

impl RenameRule {
    fn parse(s: &str) -> syn::Result<Self> {
        Ok(match s {
            "lowercase" => RenameRule::Lower,
            "UPPERCASE" => RenameRule::Upper,
            "PascalCase" => RenameRule::Pascal,
            "camelCase" => RenameRule::Camel,
            "snake_case" => RenameRule::Snake,
            "SCREAMING_SNAKE_CASE" => RenameRule::ScreamingSnake,
            "kebab-case" => RenameRule::Kebab,
            "SCREAMING-KEBAB-CASE" => RenameRule::ScreamingKebab,
            other => {
                return Err(syn::Error::new(
                    proc_macro2::Span::call_site(),
                    format!("unsupported rename_all rule: {other}"),
                ))
            }
        })
    }

    fn apply(self, field: &str) -> String {
        match self {
            RenameRule::Lower => field.to_ascii_lowercase(),
            RenameRule::Upper => field.to_ascii_uppercase(),
            RenameRule::Pascal => field.to_upper_camel_case(),
            RenameRule::Camel => field.to_lower_camel_case(),
            RenameRule::Snake => field.to_string(),
            RenameRule::ScreamingSnake => field.to_shouty_snake_case(),
            RenameRule::Kebab => field.to_kebab_case(),
            RenameRule::ScreamingKebab => field.to_shouty_kebab_case(),
        }
    }
}

/// Map a field's Rust type onto a `FieldType` variant name.
fn classify(ty: &Type) -> syn::Ident {
    let name = match ty {
        Type::Reference(r) => return classify(&r.elem),
        Type::Paren(p) => return classify(&p.elem),
        Type::Group(g) => return classify(&g.elem),
        Type::Array(_) | Type::Slice(_) => "Sequence",
        Type::Path(p) => match p.path.segments.last() {
            Some(seg) => match seg.ident.to_string().as_str() {
                "Option" | "Box" | "Arc" | "Rc" | "Cow" => {
                    if let Some(inner) = first_type_arg(&seg.arguments) {
                        return classify(inner);
                    }
                    "Object"
                }
                "String" | "str" | "char" => "String",
                "bool" => "Bool",
                "i8" | "i16" | "i32" | "i64" | "i128" | "isize" => "Int",
                "u8" | "u16" | "u32" | "u64" | "u128" | "usize" => "Uint",
                "f32" | "f64" => "Float",
                "Vec" | "VecDeque" | "HashSet" | "BTreeSet" | "IndexSet" => "Sequence",
                "HashMap" | "BTreeMap" | "IndexMap" | "Map" => "Map",
                _ => "Object",
            },
            None => "Object",
        },
        _ => "Object",
    };
    syn::Ident::new(name, proc_macro2::Span::call_site())
}

fn first_type_arg(args: &PathArguments) -> Option<&Type> {
    match args {
        PathArguments::AngleBracketed(a) => a.args.iter().find_map(|arg| match arg {
            GenericArgument::Type(t) => Some(t),
            _ => None,
        }),
        _ => None,
    }
}
