//! Derive macro generating `FromRecord` implementations for BIFF payload structs
//!
//! Fields are decoded in declaration order, each through its own `FromRecord`
//! implementation. The generated code resolves `FromRecord`, `Record`,
//! `RecordType`, `Anomalies`, `ExcelError` and `debug!` from the scope of the
//! deriving module.
//!
//! ```ignore
//! #[derive(Debug, FromRecord)]
//! #[from_record(Record, RecordType::Number)]
//! pub struct Number {
//!     pub cell: Cell,
//!     pub num: f64,
//! }
//! ```
use quote::quote;
use syn::{punctuated::Punctuated, spanned::Spanned, Data, DeriveInput, Error, Path, Token};

#[proc_macro_derive(FromRecord, attributes(from_record))]
pub fn from_record_derive(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let ast = syn::parse_macro_input!(input as DeriveInput);
    expand(&ast)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}

/// What the annotated struct decodes
enum Kind {
    /// A whole record payload, checked against any of the given `RecordType`s
    Record(Vec<Path>),
    /// A structure embedded in a record payload
    Struct,
}

fn kind_of(ast: &DeriveInput) -> Result<Kind, Error> {
    let mut attrs = ast
        .attrs
        .iter()
        .filter(|attr| attr.path().is_ident("from_record"));
    let attr = attrs.next().ok_or_else(|| {
        Error::new(
            ast.ident.span(),
            "missing #[from_record(Record, <RecordType>, ..)] or #[from_record(Struct)]",
        )
    })?;
    if let Some(dup) = attrs.next() {
        return Err(Error::new(dup.span(), "duplicate from_record attribute"));
    }
    let args = attr.parse_args_with(Punctuated::<Path, Token![,]>::parse_terminated)?;
    let args: Vec<&Path> = args.iter().collect();
    match args.as_slice() {
        [kind, record_types @ ..] if kind.is_ident("Record") && !record_types.is_empty() => Ok(
            Kind::Record(record_types.iter().map(|path| (*path).clone()).collect()),
        ),
        [kind] if kind.is_ident("Struct") => Ok(Kind::Struct),
        _ => Err(Error::new(
            attr.span(),
            "expected (Record, <RecordType>, ..) or (Struct)",
        )),
    }
}

fn expand(ast: &DeriveInput) -> Result<proc_macro2::TokenStream, Error> {
    let Data::Struct(data) = &ast.data else {
        return Err(Error::new(ast.ident.span(), "FromRecord can only be derived for structs"));
    };
    let kind = kind_of(ast)?;
    let name = &ast.ident;

    let mut idents = Vec::new();
    let mut reads = Vec::new();
    for field in data.fields.iter() {
        let ident = field
            .ident
            .as_ref()
            .ok_or_else(|| Error::new(field.span(), "FromRecord requires named fields"))?;
        let ty = &field.ty;
        reads.push(quote!(let #ident = <#ty as FromRecord>::from_record(record, anomalies)?;));
        idents.push(ident);
    }

    let type_check = match kind {
        Kind::Record(record_types) => quote! {
            if !matches!(record.ty, #(#record_types)|*) {
                return Err(ExcelError::Format(format!(
                    "Found unexpected record type {:x?}; should be {}",
                    record.ty,
                    stringify!(#(#record_types)|*)
                )));
            }
        },
        Kind::Struct => quote!(),
    };

    Ok(quote! {
        impl FromRecord for #name {
            #[allow(unused_variables)]
            fn from_record(record: &mut Record<'_>, anomalies: &mut Anomalies) -> Result<Self, ExcelError> {
                debug!("{}::from_record({record:?})", stringify!(#name));
                #type_check
                #(#reads)*
                Ok(Self { #(#idents),* })
            }
        }
    })
}
