use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, spanned::Spanned, FnArg, GenericArgument, Ident, ItemFn, Pat,
    PathArguments, Signature, Type,
};

/// Turn an async function into an integration test against a throwaway
/// database.
///
/// The harness connects to the test MongoDB server, creates a
/// randomly-named database with all indexes, builds a tracked local Rocket
/// client against it, runs the test body, and drops the database again no
/// matter how the body terminates.
///
/// Injectable parameters: `rocket::local::asynchronous::Client`,
/// `mongodb::Database`, and any number of `Coll<T>`.
///
/// An optional argument pre-authenticates the client before the body runs:
/// `#[backend_test(admin)]` as the central commissioner,
/// `#[backend_test(hall)]` as the example hall's commissioner, and
/// `#[backend_test(voter)]` as a verified candidate-eligible voter.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract type information and reject invalid function signatures.
    let (test_args, collection_idents, collection_types) = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the body so the test can keep the original name.
    let name = item_fn.sig.ident.clone();
    let inner_name = format_ident!("{}_body", name);
    item_fn.sig.ident = inner_name.clone();

    let maybe_login = match parse_macro_input!(args as Option<Ident>) {
        Some(actor) => match login_block(&actor) {
            Ok(block) => block,
            Err(err) => return err.into_compile_error().into(),
        },
        None => TokenStream2::new(),
    };

    quote! {
        #[test]
        fn #name() {
            /// The test itself.
            #item_fn

            let runtime = ::rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("backend-test")
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            let outcome = runtime.block_on(async {
                // An isolated database per test.
                let db_client = crate::test_db_client().await;
                let db_name = crate::test_database_name();
                let rocket = crate::test_rocket(db_client.clone(), &db_name).await;
                let client = ::rocket::local::asynchronous::Client::tracked(rocket)
                    .await
                    .unwrap();
                let db = db_client.database(&db_name);

                #maybe_login

                #(
                    let #collection_idents =
                        crate::model::mongodb::Coll::<#collection_types>::from_db(&db);
                )*

                // Run the body, then drop the database even if it panicked.
                let result = ::rocket::futures::FutureExt::catch_unwind(
                    ::std::panic::AssertUnwindSafe(
                        #inner_name(#(#test_args),* #(, #collection_idents)*)
                    ),
                )
                .await;
                db.drop(None).await.unwrap();
                result
            });

            // Re-raise any panic from the body.
            if let Err(cause) = outcome {
                ::std::panic::panic_any(cause);
            }
        }
    }
    .into()
}

/// The pre-authentication block for the requested actor.
fn login_block(actor: &Ident) -> Result<TokenStream2, syn::Error> {
    let account = if actor == "admin" {
        quote! { crate::model::db::voter::VoterCore::central_commissioner_example() }
    } else if actor == "hall" {
        quote! { crate::model::db::voter::VoterCore::hall_commissioner_example() }
    } else if actor == "voter" {
        quote! { crate::model::db::voter::VoterCore::eligible_example() }
    } else {
        return Err(syn::Error::new(
            actor.span(),
            "Expected one of `admin`, `hall`, or `voter`",
        ));
    };

    Ok(quote! {
        let account = #account;
        crate::model::mongodb::Coll::<crate::model::db::voter::NewVoter>::from_db(&db)
            .insert_one(&account, None)
            .await
            .unwrap();
        let login_response = client
            .post(uri!(crate::api::auth::login))
            .header(::rocket::http::ContentType::JSON)
            .body(
                ::rocket::serde::json::json!({
                    "reg_no": account.reg_no,
                    "password": crate::model::db::voter::EXAMPLE_PASSWORD,
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(login_response.status(), ::rocket::http::Status::Ok);
        // Release the borrow of `client` held by the response before the
        // client is moved into the test body.
        ::std::mem::drop(login_response);
    })
}

/// Ensure the wrapped test is async, extract parameters to inject, and
/// reject unknown parameters.
#[allow(clippy::type_complexity)]
fn check_sig(sig: Signature) -> Result<(Vec<TokenStream2>, Vec<Ident>, Vec<Ident>), syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut has_client = false;
    let mut has_db = false;
    let mut args = vec![];
    let mut collection_idents = vec![];
    let mut collection_types = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(pat_ident), Type::Path(type_path)) =
                (&*pat_type.pat, &*pat_type.ty)
            {
                if let Some(type_ident) = type_path.path.get_ident() {
                    if type_ident == "Client" {
                        if has_client {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test cannot accept more than one `Client`",
                            ));
                        }
                        has_client = true;
                        args.push(quote! { client });
                        continue;
                    } else if type_ident == "Database" {
                        if has_db {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test cannot accept more than one `Database`",
                            ));
                        }
                        has_db = true;
                        args.push(quote! { db.clone() });
                        continue;
                    }
                } else {
                    // Any path's last segment is the type itself.
                    let last_segment = type_path.path.segments.last().unwrap();
                    if last_segment.ident == "Coll" {
                        if let PathArguments::AngleBracketed(generics) = &last_segment.arguments {
                            if let Some(GenericArgument::Type(Type::Path(inner))) =
                                generics.args.first()
                            {
                                if let Some(inner_ident) = inner.path.get_ident() {
                                    collection_idents.push(pat_ident.ident.clone());
                                    collection_types.push(inner_ident.clone());
                                    continue;
                                }
                            }
                        }
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `client_ident: Client`, `db_ident: Database` or \
             `collection_ident: Coll<T>`",
        ));
    }

    Ok((args, collection_idents, collection_types))
}
