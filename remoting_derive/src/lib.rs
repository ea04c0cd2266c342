// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Procedural macro generating the bindings of a remotable interface in `remoting`.
//!
//! Annotating an `async` trait with `#[remote_interface]` emits
//!
//! 1. The trait itself, run through `async_trait`
//! 2. `impl remoting::RemoteInterface for dyn Trait`, describing the trait's name, kind, methods
//!    and base interfaces
//! 3. `impl<T: Trait> remoting::ServiceInterface<T> for dyn Trait`, binding an invoker for every
//!    method which decodes the arguments, calls the target and encodes the result
//! 4. `impl remoting::ProxyInterface for dyn Trait` along with `impl Trait for remoting::ServiceProxy`,
//!    marshalling every call into a request
//!
//! Caveats:
//!
//! 1. Every method is `async`, takes `&self` and returns a `Result<R, E>` where `E: From<remoting::RemotingErr>`
//! 2. All arguments and the result type `R` **MUST** implement `remoting::BytesConvertable`
//! 3. A final argument of type `CancellationToken` isn't sent over-the-wire. It marks the method as
//!    cancellable and receives the server-side cancellation signal
//! 4. Every supertrait other than `Send`, `Sync`, `Sized` and `Unpin` is treated as a base interface
//!    and must itself be a `#[remote_interface]`
//! 5. Methods are numbered in declaration order. Reordering methods changes their legacy ids
//!
//! Properties:
//!
//! * `name = "..."` - The interface's wire name, defaults to the trait's identifier
//! * `contract` - Describe the interface as a contract instead of a marker

extern crate proc_macro;
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::format_ident;
use quote::quote;
use syn::spanned::Spanned;
use syn::FnArg;
use syn::GenericArgument;
use syn::Ident;
use syn::ItemTrait;
use syn::LitStr;
use syn::Pat;
use syn::PathArguments;
use syn::ReturnType;
use syn::TraitItem;
use syn::TraitItemFn;
use syn::Type;
use syn::TypeParamBound;

const AUTO_TRAITS: [&str; 4] = ["Send", "Sync", "Sized", "Unpin"];

/// Generate the description, dispatch and proxy bindings of a remotable interface
///
/// ```ignore
/// use remoting::{remote_interface, CancellationToken, ProcessingErr};
///
/// #[remote_interface(name = "inventory.Warehouse", contract)]
/// pub trait Warehouse: Send + Sync {
///     async fn stock(&self, item: String) -> Result<u64, ProcessingErr>;
///     async fn restock(
///         &self,
///         item: String,
///         amount: u64,
///         cancel: CancellationToken,
///     ) -> Result<(), ProcessingErr>;
/// }
/// ```
#[proc_macro_attribute]
pub fn remote_interface(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut properties = InterfaceProperties::default();
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("name") {
            properties.name = Some(meta.value()?.parse()?);
            Ok(())
        } else if meta.path.is_ident("contract") {
            properties.contract = true;
            Ok(())
        } else {
            Err(meta.error("unsupported remote_interface property, expected `name` or `contract`"))
        }
    });
    syn::parse_macro_input!(args with parser);

    let item: ItemTrait = match syn::parse(input) {
        Ok(item) => item,
        Err(err) => return err.to_compile_error().into(),
    };

    match impl_remote_interface(properties, item) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct InterfaceProperties {
    name: Option<LitStr>,
    contract: bool,
}

struct RemoteParam {
    ident: Ident,
    ty: Type,
}

struct RemoteMethod {
    ordinal: usize,
    ident: Ident,
    params: Vec<RemoteParam>,
    cancel: Option<Ident>,
    returns: Type,
    sig: syn::Signature,
}

fn impl_remote_interface(
    properties: InterfaceProperties,
    item: ItemTrait,
) -> syn::Result<TokenStream2> {
    if !item.generics.params.is_empty() {
        return Err(syn::Error::new(
            item.generics.span(),
            "remote interfaces can't be generic",
        ));
    }
    if let Some(other) = item
        .items
        .iter()
        .find(|trait_item| !matches!(trait_item, TraitItem::Fn(_)))
    {
        return Err(syn::Error::new(
            other.span(),
            "remote interfaces may only declare methods",
        ));
    }

    let trait_ident = &item.ident;
    let wire_name = properties
        .name
        .unwrap_or_else(|| LitStr::new(&trait_ident.to_string(), trait_ident.span()));

    let bases = item
        .supertraits
        .iter()
        .filter_map(|bound| match bound {
            TypeParamBound::Trait(bound)
                if !matches!(bound.modifier, syn::TraitBoundModifier::Maybe(_)) =>
            {
                let last = bound.path.segments.last()?;
                if AUTO_TRAITS.contains(&last.ident.to_string().as_str()) {
                    None
                } else {
                    Some(bound.path.clone())
                }
            }
            _ => None,
        })
        .collect::<Vec<_>>();

    let methods = item
        .items
        .iter()
        .filter_map(|trait_item| match trait_item {
            TraitItem::Fn(method) => Some(method),
            _ => None,
        })
        .enumerate()
        .map(|(ordinal, method)| parse_method(ordinal, method))
        .collect::<syn::Result<Vec<_>>>()?;

    let signature = impl_signature(trait_ident, &wire_name, properties.contract, &methods, &bases);
    let service = impl_service(trait_ident, &methods, &bases);
    let proxy = impl_proxy(trait_ident, &methods);

    Ok(quote! {
        #[::remoting::async_trait]
        #item

        #signature

        #service

        #proxy
    })
}

fn parse_method(ordinal: usize, method: &TraitItemFn) -> syn::Result<RemoteMethod> {
    let sig = &method.sig;
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(
            sig.fn_token.span(),
            "remote interface methods must be async",
        ));
    }
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new(
            sig.generics.span(),
            "remote interface methods can't be generic",
        ));
    }

    let mut inputs = sig.inputs.iter().peekable();
    match inputs.next() {
        Some(FnArg::Receiver(receiver))
            if receiver.reference.is_some() && receiver.mutability.is_none() => {}
        _ => {
            return Err(syn::Error::new(
                sig.ident.span(),
                "remote interface methods must take `&self`",
            ))
        }
    }

    let mut params = vec![];
    let mut cancel = None;
    while let Some(input) = inputs.next() {
        let FnArg::Typed(arg) = input else {
            return Err(syn::Error::new(input.span(), "unexpected receiver"));
        };
        let Pat::Ident(pat) = arg.pat.as_ref() else {
            return Err(syn::Error::new(
                arg.pat.span(),
                "remote interface arguments must be plain identifiers",
            ));
        };
        if matches!(arg.ty.as_ref(), Type::Reference(_)) {
            return Err(syn::Error::new(
                arg.ty.span(),
                "remote interface arguments must be owned values",
            ));
        }
        if is_cancellation_token(&arg.ty) {
            if inputs.peek().is_some() {
                return Err(syn::Error::new(
                    arg.ty.span(),
                    "a CancellationToken must be the last argument",
                ));
            }
            cancel = Some(pat.ident.clone());
            continue;
        }
        params.push(RemoteParam {
            ident: pat.ident.clone(),
            ty: arg.ty.as_ref().clone(),
        });
    }

    Ok(RemoteMethod {
        ordinal,
        ident: sig.ident.clone(),
        params,
        cancel,
        returns: result_type(&sig.output)?,
        sig: sig.clone(),
    })
}

fn is_cancellation_token(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .map(|segment| segment.ident == "CancellationToken")
            .unwrap_or(false),
        _ => false,
    }
}

/// The `R` of a `Result<R, E>` return type
fn result_type(output: &ReturnType) -> syn::Result<Type> {
    let ReturnType::Type(_, ty) = output else {
        return Err(syn::Error::new(
            output.span(),
            "remote interface methods must return a Result",
        ));
    };
    if let Type::Path(path) = ty.as_ref() {
        if let Some(segment) = path.path.segments.last() {
            if let PathArguments::AngleBracketed(args) = &segment.arguments {
                if segment.ident == "Result" && args.args.len() == 2 {
                    if let Some(GenericArgument::Type(ok)) = args.args.first() {
                        return Ok(ok.clone());
                    }
                }
            }
        }
    }
    Err(syn::Error::new(
        ty.span(),
        "remote interface methods must return a Result<T, E>",
    ))
}

fn impl_signature(
    trait_ident: &Ident,
    wire_name: &LitStr,
    contract: bool,
    methods: &[RemoteMethod],
    bases: &[syn::Path],
) -> TokenStream2 {
    let constructor = if contract {
        format_ident!("contract")
    } else {
        format_ident!("marker")
    };
    let methods = methods.iter().map(|method| {
        let name = method.ident.to_string();
        let params = method.params.iter().map(|param| &param.ty);
        let returns = &method.returns;
        let cancellable = method.cancel.as_ref().map(|_| quote! { .cancellable() });
        quote! {
            .method(
                ::remoting::MethodSignature::new(#name)
                    #(.param::<#params>())*
                    .returns::<#returns>()
                    #cancellable
            )
        }
    });

    quote! {
        impl ::remoting::RemoteInterface for dyn #trait_ident {
            fn signature() -> ::remoting::InterfaceSignature {
                ::remoting::InterfaceSignature::#constructor(#wire_name)
                    #(#methods)*
                    #(.base::<dyn #bases>())*
            }
        }
    }
}

fn impl_service(trait_ident: &Ident, methods: &[RemoteMethod], bases: &[syn::Path]) -> TokenStream2 {
    let invokers = methods.iter().map(|method| {
        let ordinal = method.ordinal;
        let ident = &method.ident;
        let (decode, args): (Vec<_>, Vec<_>) = method
            .params
            .iter()
            .map(|param| {
                let name = &param.ident;
                let ty = &param.ty;
                (quote! { let #name = __args.next::<#ty>()?; }, quote! { #name })
            })
            .unzip();
        let reader = if method.params.is_empty() {
            quote! { __args }
        } else {
            quote! { mut __args }
        };
        let (cancel_binding, cancel_arg) = if method.cancel.is_some() {
            (quote! { __cancel }, Some(quote! { __cancel }))
        } else {
            (quote! { _ }, None)
        };
        let call_args = args.into_iter().chain(cancel_arg);

        quote! {
            .method::<dyn #trait_ident, _, _>(
                #ordinal,
                |__target: ::std::sync::Arc<__T>,
                 #reader: ::remoting::ArgumentReader,
                 #cancel_binding: ::remoting::CancellationToken| async move {
                    #(#decode)*
                    __args.finish()?;
                    ::remoting::encode_result(
                        <__T as #trait_ident>::#ident(&*__target, #(#call_args),*).await
                    )
                },
            )
        }
    });

    quote! {
        impl<__T> ::remoting::ServiceInterface<__T> for dyn #trait_ident
        where
            __T: #trait_ident + ?Sized + Send + Sync + 'static,
        {
            fn bind(binder: &mut ::remoting::InvokerBinder<__T>) {
                binder
                    #(.bind::<dyn #bases>())*
                    #(#invokers)*;
            }
        }
    }
}

fn impl_proxy(trait_ident: &Ident, methods: &[RemoteMethod]) -> TokenStream2 {
    let proxied = methods.iter().map(|method| {
        let sig = &method.sig;
        let ordinal = method.ordinal;
        let returns = &method.returns;
        let pushes = method.params.iter().map(|param| {
            let name = &param.ident;
            quote! { __args.push(#name); }
        });
        let writer = if method.params.is_empty() {
            quote! { __args }
        } else {
            quote! { mut __args }
        };
        let cancel = match &method.cancel {
            Some(token) => quote! { ::std::option::Option::Some(#token) },
            None => quote! { ::std::option::Option::None },
        };
        quote! {
            #sig {
                let #writer = ::remoting::ArgumentWriter::new();
                #(#pushes)*
                self.invoke::<dyn #trait_ident, #returns>(#ordinal, __args, #cancel)
                    .await
                    .map_err(::std::convert::From::from)
            }
        }
    });

    quote! {
        impl ::remoting::ProxyInterface for dyn #trait_ident {
            fn from_proxy(proxy: ::remoting::ServiceProxy) -> ::std::sync::Arc<Self> {
                ::std::sync::Arc::new(proxy)
            }
        }

        #[::remoting::async_trait]
        impl #trait_ident for ::remoting::ServiceProxy {
            #(#proxied)*
        }
    }
}
