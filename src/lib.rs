//! # graftql
//!
//! A runtime GraphQL client: describe which fields of which types you want
//! as a nested selection tree, and graftql compiles it into a wire
//! query/mutation/subscription document, executes it, and routes results
//! back.
//!
//! ## Example
//!
//! ```rust,ignore
//! use graftql::prelude::*;
//! use serde_json::json;
//!
//! let client = Client::builder("https://api.example.com/graphql").build();
//!
//! // query($user_id_1: ID!) { user(id: $user_id_1) { name __typename } }
//! let data = client
//!     .query(&SelectionSet::new().field_args_nested(
//!         "user",
//!         Arguments::new().arg("id", "ID!", json!("u1")),
//!         SelectionSet::typed("User").field("name").typename(),
//!     ))
//!     .await?;
//!
//! // Subscriptions multiplex over one persistent connection.
//! let subs = client.subscriptions().await?;
//! let op = compile(
//!     &SelectionSet::new().field("ticks"),
//!     OperationKind::Subscription,
//!     client.link_map(),
//! )?;
//! let mut stream = subs.subscribe(&op);
//! while let Some(event) = stream.next().await {
//!     println!("tick: {:?}", event?);
//! }
//! ```
//!
//! ## Pieces
//!
//! - [`SelectionSet`] — the selection tree: fields, arguments, aliases, and
//!   type-conditional sub-selections.
//! - [`compile`] — the operation compiler: tree in, wire document plus
//!   hoisted variables out.
//! - [`TypeLinkMap`] — schema-derived abstract/concrete type links, used for
//!   `on_<T>` validation, `__scalar` expansion, and runtime discrimination.
//! - [`Transport`] — HTTP execution with per-call header resolution and
//!   optional time-windowed batching.
//! - [`SubscriptionClient`] — many logical subscriptions over one WebSocket,
//!   demultiplexed by correlation id.

mod client;
mod compile;
mod config;
mod connection;
mod error;
pub mod prelude;
mod selection;
mod subscription;
mod transport;
mod types;

pub use client::{Client, ClientBuilder};
pub use compile::{compile, compile_named, CompiledOperation, OperationKind};
pub use config::{BatchOptions, ClientConfig, HeaderSource, StaticHeaders};
pub use connection::ConnectionState;
pub use error::{
    ClientError, GraphqlOperationError, SelectionError, SubscriptionError, TransportError,
};
pub use selection::{Argument, Arguments, Selection, SelectionSet};
pub use subscription::{SubscriptionClient, SubscriptionHandle};
pub use transport::{Dispatch, GraphqlError, HttpDispatch, OperationPayload, ResponsePayload, Transport};
pub use types::{typename_of, TypeLinkMap};

pub use serde_json::Value;
