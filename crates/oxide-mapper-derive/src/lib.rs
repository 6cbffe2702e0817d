//! Derive macro for accessor-style beans.
//!
//! This crate provides `#[derive(Bean)]`, which implements
//! `oxide_mapper::AccessorBean` from a struct's named fields.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::meta::ParseNestedMeta;
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Fields, GenericArgument, LitStr, Meta, PathArguments,
    Type,
};

/// Derives `AccessorBean` for a struct with named fields.
///
/// The struct must implement `Default`. Every field becomes a property named
/// after the field.
///
/// # Struct Attributes
///
/// - `#[bean(table = "table_name")]` - Table the bean maps to (optional,
///   defaults to the configured naming convention)
///
/// # Field Attributes
///
/// - `#[column(name = "column_name")]` - Column the property maps to
///   (optional, defaults to the field name)
/// - `#[column(skip)]` or `#[bean(skip)]` - Leaves the field out of the bean
/// - `#[one_to_many]` - Marks a collection of detail beans; accepts
///   `detail_table = "..."` and `foreign_key = "..."`
/// - `#[many_to_many(join_table = "...")]` - Marks a collection linked
///   through a join table; also accepts `fk_to_owner`, `fk_to_detail`,
///   `detail_table` and `detail_pk`
///
/// Relation fields must be a generic collection such as `Vec<Address>`;
/// the first type argument is the element bean.
#[proc_macro_derive(Bean, attributes(bean, column, one_to_many, many_to_many))]
pub fn derive_bean(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    derive_bean_impl(&input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn derive_bean_impl(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let table_name = parse_bean_attrs(&input.attrs)?;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Bean derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Bean derive only supports structs",
            ));
        }
    };

    let mut properties: Vec<TokenStream2> = Vec::new();
    for field in fields {
        let Some(field_name) = field.ident.as_ref() else {
            continue;
        };
        let attrs = parse_field_attrs(&field.attrs)?;
        if attrs.skip {
            continue;
        }
        let property_name = field_name.to_string();
        let field_type = &field.ty;

        let property = match &attrs.relation {
            None => {
                let column = attrs.column.as_ref().map(|column| quote!(.with_column(#column)));
                quote! {
                    ::oxide_mapper::BeanProperty::<Self>::field::<#field_type>(
                        #property_name,
                        |bean: &Self| ::std::clone::Clone::clone(&bean.#field_name),
                        |bean: &mut Self, value: #field_type| bean.#field_name = value,
                    )
                    #column
                }
            }
            Some(relation) => {
                let element = element_type(field_type)?;
                let hint = relation.to_tokens();
                quote! {
                    ::oxide_mapper::BeanProperty::<Self>::collection::<#element, #field_type>(
                        #property_name,
                        |bean: &mut Self, value: #field_type| bean.#field_name = value,
                    )
                    .with_relation(#hint)
                }
            }
        };
        properties.push(property);
    }

    let table_fn = table_name.map(|table| {
        quote! {
            fn table_name() -> ::std::option::Option<&'static str> {
                ::std::option::Option::Some(#table)
            }
        }
    });

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    Ok(quote! {
        impl #impl_generics ::oxide_mapper::AccessorBean for #struct_name #ty_generics #where_clause {
            fn properties() -> ::std::vec::Vec<::oxide_mapper::BeanProperty<Self>> {
                ::std::vec![#(#properties),*]
            }

            #table_fn
        }
    })
}

#[derive(Default)]
struct FieldAttrs {
    column: Option<String>,
    skip: bool,
    relation: Option<Relation>,
}

enum Relation {
    OneToMany {
        detail_table: Option<String>,
        foreign_key: Option<String>,
    },
    ManyToMany {
        join_table: String,
        fk_to_owner: Option<String>,
        fk_to_detail: Option<String>,
        detail_table: Option<String>,
        detail_pk: Option<String>,
    },
}

impl Relation {
    fn to_tokens(&self) -> TokenStream2 {
        match self {
            Self::OneToMany {
                detail_table,
                foreign_key,
            } => {
                let detail_table = optional_string(detail_table.as_deref());
                let foreign_key = optional_string(foreign_key.as_deref());
                quote! {
                    ::oxide_mapper::RelationHint::OneToMany(::oxide_mapper::OneToManyHint {
                        detail_table: #detail_table,
                        foreign_key: #foreign_key,
                    })
                }
            }
            Self::ManyToMany {
                join_table,
                fk_to_owner,
                fk_to_detail,
                detail_table,
                detail_pk,
            } => {
                let fk_to_owner = optional_string(fk_to_owner.as_deref());
                let fk_to_detail = optional_string(fk_to_detail.as_deref());
                let detail_table = optional_string(detail_table.as_deref());
                let detail_pk = optional_string(detail_pk.as_deref());
                quote! {
                    ::oxide_mapper::RelationHint::ManyToMany(::oxide_mapper::ManyToManyHint {
                        join_table: ::std::string::String::from(#join_table),
                        fk_to_owner: #fk_to_owner,
                        fk_to_detail: #fk_to_detail,
                        detail_table: #detail_table,
                        detail_pk: #detail_pk,
                    })
                }
            }
        }
    }
}

fn optional_string(value: Option<&str>) -> TokenStream2 {
    match value {
        Some(value) => quote!(::std::option::Option::Some(::std::string::String::from(#value))),
        None => quote!(::std::option::Option::None),
    }
}

fn string_value(meta: &ParseNestedMeta) -> syn::Result<String> {
    let value: LitStr = meta.value()?.parse()?;
    Ok(value.value())
}

fn parse_bean_attrs(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    let mut table_name = None;
    for attr in attrs {
        if attr.path().is_ident("bean") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("table") {
                    table_name = Some(string_value(&meta)?);
                    Ok(())
                } else {
                    Err(meta.error("unsupported bean attribute, expected `table`"))
                }
            })?;
        }
    }
    Ok(table_name)
}

fn parse_field_attrs(attrs: &[Attribute]) -> syn::Result<FieldAttrs> {
    let mut result = FieldAttrs::default();

    for attr in attrs {
        if attr.path().is_ident("column") || attr.path().is_ident("bean") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    result.skip = true;
                } else if meta.path.is_ident("name") {
                    result.column = Some(string_value(&meta)?);
                } else {
                    return Err(meta.error("unsupported column attribute, expected `name` or `skip`"));
                }
                Ok(())
            })?;
        } else if attr.path().is_ident("one_to_many") {
            let mut detail_table = None;
            let mut foreign_key = None;
            // Bare `#[one_to_many]` leaves everything to the schema
            if !matches!(attr.meta, Meta::Path(_)) {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("detail_table") {
                        detail_table = Some(string_value(&meta)?);
                    } else if meta.path.is_ident("foreign_key") {
                        foreign_key = Some(string_value(&meta)?);
                    } else {
                        return Err(meta.error(
                            "unsupported one_to_many attribute, expected `detail_table` or `foreign_key`",
                        ));
                    }
                    Ok(())
                })?;
            }
            set_relation(
                &mut result,
                attr,
                Relation::OneToMany {
                    detail_table,
                    foreign_key,
                },
            )?;
        } else if attr.path().is_ident("many_to_many") {
            let mut join_table = None;
            let mut fk_to_owner = None;
            let mut fk_to_detail = None;
            let mut detail_table = None;
            let mut detail_pk = None;
            attr.parse_nested_meta(|meta| {
                let value = string_value(&meta)?;
                if meta.path.is_ident("join_table") {
                    join_table = Some(value);
                } else if meta.path.is_ident("fk_to_owner") {
                    fk_to_owner = Some(value);
                } else if meta.path.is_ident("fk_to_detail") {
                    fk_to_detail = Some(value);
                } else if meta.path.is_ident("detail_table") {
                    detail_table = Some(value);
                } else if meta.path.is_ident("detail_pk") {
                    detail_pk = Some(value);
                } else {
                    return Err(meta.error("unsupported many_to_many attribute"));
                }
                Ok(())
            })?;
            let join_table = join_table
                .ok_or_else(|| syn::Error::new_spanned(attr, "many_to_many requires `join_table`"))?;
            set_relation(
                &mut result,
                attr,
                Relation::ManyToMany {
                    join_table,
                    fk_to_owner,
                    fk_to_detail,
                    detail_table,
                    detail_pk,
                },
            )?;
        }
    }

    Ok(result)
}

fn set_relation(attrs: &mut FieldAttrs, attr: &Attribute, relation: Relation) -> syn::Result<()> {
    if attrs.relation.is_some() {
        return Err(syn::Error::new_spanned(
            attr,
            "a field can declare only one relation",
        ));
    }
    attrs.relation = Some(relation);
    Ok(())
}

/// The first generic argument of a collection type, e.g. `Address` in
/// `Vec<Address>`.
fn element_type(ty: &Type) -> syn::Result<&Type> {
    if let Type::Path(path) = ty {
        if let Some(segment) = path.path.segments.last() {
            if let PathArguments::AngleBracketed(args) = &segment.arguments {
                if let Some(GenericArgument::Type(element)) = args.args.first() {
                    return Ok(element);
                }
            }
        }
    }
    Err(syn::Error::new_spanned(
        ty,
        "relation fields must be a collection with the element bean as first type argument",
    ))
}
