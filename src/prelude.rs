//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use graftql::prelude::*;
//!
//! let client = Client::builder("https://api.example.com/graphql").build();
//! let subs = client.subscriptions().await?;
//! // StreamExt methods on subscription handles without a separate import
//! ```

pub use crate::{
    compile, compile_named, Arguments, BatchOptions, Client, ClientBuilder, ClientError,
    CompiledOperation, OperationKind, Selection, SelectionSet, SubscriptionClient,
    SubscriptionHandle, TypeLinkMap,
};

pub use futures_util::StreamExt;
