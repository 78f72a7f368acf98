use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote};
use syn::{
    Attribute, FnArg, GenericArgument, Ident, ImplItem, ItemImpl, LitStr, Path, PathArguments,
    ReturnType, Signature, Type,
    parse::{Parse, ParseStream, Result},
};

// ─── Input AST types ─────────────────────────────────────────────────────────

/// Arguments of `#[socket_controller(...)]`.
pub struct ControllerOptions {
    /// Skip the static registration.
    manual: bool,
}

impl Parse for ControllerOptions {
    fn parse(input: ParseStream) -> Result<Self> {
        if input.is_empty() {
            return Ok(Self { manual: false });
        }
        let key: Ident = input.parse()?;
        if key != "manual" {
            return Err(syn::Error::new(
                key.span(),
                format!("unknown option `{key}`; expected `manual`"),
            ));
        }
        Ok(Self { manual: true })
    }
}

/// Arguments of `#[socket_mapping(...)]`.
struct MappingArgs {
    path: LitStr,
    filters: Vec<Path>,
    optional_body: bool,
}

/// The handler attribute found on a method.
enum HandlerAttr {
    Connect,
    Disconnect,
    Message(MappingArgs),
}

const HANDLER_ATTRS: [&str; 3] = ["on_connect", "on_disconnect", "socket_mapping"];

// ─── Parsing ──────────────────────────────────────────────────────────────────

fn is_handler_attr(attr: &Attribute) -> bool {
    HANDLER_ATTRS.iter().any(|name| attr.path().is_ident(name))
}

/// Parse `#[socket_mapping(path = "…", filters(A, B), optional_body)]`.
fn parse_mapping(attr: &Attribute) -> Result<MappingArgs> {
    let mut path = None;
    let mut filters = Vec::new();
    let mut optional_body = false;

    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("path") {
            path = Some(meta.value()?.parse::<LitStr>()?);
            Ok(())
        } else if meta.path.is_ident("filters") {
            meta.parse_nested_meta(|filter| {
                filters.push(filter.path);
                Ok(())
            })
        } else if meta.path.is_ident("optional_body") {
            optional_body = true;
            Ok(())
        } else {
            Err(meta.error("unknown option; expected path, filters, or optional_body"))
        }
    })?;

    let path = path.ok_or_else(|| {
        syn::Error::new_spanned(attr, "socket_mapping requires `path = \"…\"`")
    })?;

    Ok(MappingArgs {
        path,
        filters,
        optional_body,
    })
}

/// Removes the handler attribute from `attrs` and parses it.
///
/// Returns `None` for a method without one.
fn take_handler_attr(attrs: &mut Vec<Attribute>) -> Result<Option<HandlerAttr>> {
    let mut found: Option<HandlerAttr> = None;

    for attr in attrs.iter().filter(|attr| is_handler_attr(attr)) {
        if found.is_some() {
            return Err(syn::Error::new_spanned(
                attr,
                "a method can carry only one of on_connect, on_disconnect, or socket_mapping",
            ));
        }
        found = Some(if attr.path().is_ident("on_connect") {
            attr.meta.require_path_only()?;
            HandlerAttr::Connect
        } else if attr.path().is_ident("on_disconnect") {
            attr.meta.require_path_only()?;
            HandlerAttr::Disconnect
        } else {
            HandlerAttr::Message(parse_mapping(attr)?)
        });
    }

    attrs.retain(|attr| !is_handler_attr(attr));
    Ok(found)
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Declared parameter types, receiver excluded. The receiver must be `&self`.
fn parameter_types(sig: &Signature) -> Result<Vec<&Type>> {
    let mut inputs = sig.inputs.iter();

    match inputs.next() {
        Some(FnArg::Receiver(receiver))
            if receiver.reference.is_some() && receiver.colon_token.is_none() =>
        {
            if let Some(mutability) = receiver.mutability {
                return Err(syn::Error::new_spanned(
                    mutability,
                    "handler methods must take `&self`, not `&mut self`",
                ));
            }
        }
        _ => {
            return Err(syn::Error::new_spanned(
                &sig.ident,
                "handler methods must take `&self`",
            ));
        }
    }

    Ok(inputs
        .filter_map(|arg| match arg {
            FnArg::Typed(pat) => Some(&*pat.ty),
            FnArg::Receiver(_) => None,
        })
        .collect())
}

/// `Request<T>` → `T`.
fn request_body(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    if path.qself.is_some() {
        return None;
    }
    let segment = path.path.segments.last()?;
    if segment.ident != "Request" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.iter().collect::<Vec<_>>().as_slice() {
        [GenericArgument::Type(body)] => Some(body),
        _ => None,
    }
}

/// `ChatController` → `__SWITCHBOARD_CONTROLLER_CHATCONTROLLER`.
fn registration_ident(self_ty: &Type) -> Result<Ident> {
    let Type::Path(path) = self_ty else {
        return Err(syn::Error::new_spanned(
            self_ty,
            "socket_controller requires a named type",
        ));
    };
    let last = path
        .path
        .segments
        .last()
        .ok_or_else(|| syn::Error::new_spanned(self_ty, "empty type path"))?;
    let upper = last.ident.to_string().to_uppercase();
    Ok(Ident::new(
        &format!("__SWITCHBOARD_CONTROLLER_{upper}"),
        Span::call_site(),
    ))
}

// ─── Code generation ──────────────────────────────────────────────────────────

/// One `HandlerMethod` expression.
fn describe_method(handler: &HandlerAttr, sig: &Signature) -> Result<TokenStream> {
    let core = quote! { ::switchboard_core };

    let ident = &sig.ident;
    let name = ident.to_string();
    let params = parameter_types(sig)?;

    let param_tokens = params
        .iter()
        .map(|ty| quote! { #core::TypeToken::of::<#ty>() });
    let returns = match &sig.output {
        ReturnType::Default => quote! { #core::TypeToken::unit() },
        ReturnType::Type(_, ty) => quote! { #core::TypeToken::of::<#ty>() },
    };

    let arg_idents: Vec<Ident> = (0..params.len()).map(|i| format_ident!("__arg{i}")).collect();
    let call = if sig.asyncness.is_some() {
        quote! { __this.#ident(#(#arg_idents),*).await }
    } else {
        quote! { __this.#ident(#(#arg_idents),*) }
    };

    let kind = match handler {
        HandlerAttr::Connect => quote! { #core::HandlerKind::Connect },
        HandlerAttr::Disconnect => quote! { #core::HandlerKind::Disconnect },
        HandlerAttr::Message(mapping) => {
            let path = &mapping.path;
            let filters = mapping
                .filters
                .iter()
                .map(|filter| quote! { #core::FilterRef::of::<#filter>() });
            let mut tokens = quote! {
                #core::MessageMapping::new(#path).filters(::std::vec![ #(#filters),* ])
            };
            if mapping.optional_body {
                tokens.extend(quote! { .optional_body() });
            }
            if let Some(body) = params.first().and_then(|ty| request_body(ty)) {
                tokens.extend(quote! { .body(#core::BodyType::of::<#body>()) });
            }
            quote! { #core::HandlerKind::Message(#tokens) }
        }
    };

    Ok(quote! {
        #core::HandlerMethod::new(
            #name,
            #core::MethodSignature::new(::std::vec![ #(#param_tokens),* ], #returns),
            |__owner, mut __args| {
                #core::futures::FutureExt::boxed(async move {
                    let __this = #core::downcast_owner::<Self>(__owner)?;
                    #( let #arg_idents = __args.take::<#params>()?; )*
                    let _ = #call;
                    ::core::result::Result::Ok::<(), #core::InvokeError>(())
                })
            },
        )
        .kind(#kind)
    })
}

pub fn expand(options: ControllerOptions, mut item: ItemImpl) -> Result<TokenStream> {
    if let Some((_, path, _)) = &item.trait_ {
        return Err(syn::Error::new_spanned(
            path,
            "socket_controller must be placed on an inherent impl block",
        ));
    }
    if !item.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &item.generics,
            "generic socket controllers are not supported",
        ));
    }

    let mut methods = Vec::new();
    for impl_item in &mut item.items {
        let ImplItem::Fn(func) = impl_item else {
            continue;
        };
        if let Some(handler) = take_handler_attr(&mut func.attrs)? {
            methods.push(describe_method(&handler, &func.sig)?);
        }
    }

    let self_ty = &item.self_ty;

    let registration = if options.manual {
        quote! {}
    } else {
        let static_name = registration_ident(self_ty)?;
        let type_name = quote!(#self_ty).to_string();
        quote! {
            #[::switchboard_core::linkme::distributed_slice(::switchboard_core::SOCKET_CONTROLLERS)]
            #[linkme(crate = ::switchboard_core::linkme)]
            static #static_name: ::switchboard_core::ControllerEntry =
                ::switchboard_core::ControllerEntry::new(
                    #type_name,
                    <#self_ty as ::switchboard_core::SocketController>::descriptor,
                );
        }
    };

    Ok(quote! {
        #item

        impl ::switchboard_core::SocketController for #self_ty {
            #[allow(unused_mut)]
            fn handler_methods() -> ::std::vec::Vec<::switchboard_core::HandlerMethod> {
                ::std::vec![ #(#methods),* ]
            }
        }

        #registration
    })
}
