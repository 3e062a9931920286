//! Self-healing FreeSWITCH Event Socket (ESL) session for Rust
//!
//! One TCP connection to `mod_event_socket` carries three things at once:
//! the auth handshake, a stream of events pushed by the switch, and
//! request/reply commands (`api`, `bgapi`, `filter`, `sendmsg`). This crate
//! keeps that connection alive: when the socket drops, a background reader
//! dials again, re-authenticates, and restores event subscriptions and
//! filters before handing events to your handlers again.
//!
//! # Architecture
//!
//! - [`EslSession`] (Clone + Send) sends commands from any task. Commands are
//!   serialized end to end, so each caller gets its own reply.
//! - A background reader task owns the socket's read side and reconnects
//!   with bounded retries ([`SessionOptions::reconnects`], [`ReconnectDelay`]).
//! - Events go through a bounded queue to a dispatcher task that starts
//!   handlers from a [`HandlerRegistry`] in wire order.
//! - [`ConnectionStatus`] is published on a watch channel; a session that
//!   gives up ends in [`ConnectionStatus::Disconnected`].
//!
//! # Examples
//!
//! ## Commands
//!
//! ```rust,no_run
//! use freeswitch_esl_session::{EslError, EslSession, HandlerRegistry, SessionOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), EslError> {
//!     let options = SessionOptions::new("127.0.0.1:8021", "ClueCon");
//!     let session = EslSession::connect(options, HandlerRegistry::new()).await?;
//!
//!     println!("{}", session.api("status").await?);
//!     let job = session.bgapi("originate user/1000 &park").await?;
//!     println!("background job {}", job);
//!
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Event handlers
//!
//! Handlers are registered by `Event-Name`; custom events use
//! `CUSTOM <subclass>`. The session subscribes to exactly the registered
//! names, or to everything when `ALL` is registered; an `ALL` handler then
//! receives every event that has no handler of its own.
//!
//! ```rust,no_run
//! use freeswitch_esl_session::{handler_fn, EslSession, HandlerRegistry, SessionOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handlers = HandlerRegistry::new()
//!         .on("CHANNEL_ANSWER", handler_fn(|event| async move {
//!             println!("answered {:?}", event.unique_id());
//!         }))
//!         .on("CUSTOM sofia::register", handler_fn(|event| async move {
//!             let fields = event.to_map(&[]);
//!             println!("register from {:?}", fields.get("from-user"));
//!         }));
//!
//!     let options = SessionOptions::new("127.0.0.1:8021", "ClueCon")
//!         .with_filter("Call-Direction", "inbound");
//!     let session = EslSession::connect(options, handlers).await?;
//!
//!     let reason = session.closed().await;
//!     eprintln!("session ended: {}", reason);
//!     Ok(())
//! }
//! ```
//!
//! ## Pooled command sessions
//!
//! ```rust,no_run
//! use freeswitch_esl_session::{SessionOptions, SessionPool};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), freeswitch_esl_session::EslError> {
//! let pool = SessionPool::new(SessionOptions::new("127.0.0.1:8021", "ClueCon"), 4);
//! let session = pool.acquire(Duration::from_secs(1)).await?;
//! let channels = session.api("show channels").await?;
//! for row in freeswitch_esl_session::headers::map_chan_data(&channels) {
//!     println!("{:?}", row.get("uuid"));
//! }
//! # Ok(())
//! # }
//! ```

#[macro_use]
mod macros;

pub mod backoff;
pub mod command;
pub mod config;
pub mod connection;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod headers;
pub mod pool;
pub mod protocol;

pub use backoff::ReconnectDelay;
pub use command::{subscription_list, EslCommand, EslReply, ReplyStatus};
pub use config::SessionOptions;
pub use connection::{
    AsyncStream, BoxedStream, ConnectionStatus, Dialer, DisconnectReason, EslSession, TcpDialer,
};
pub use constants::DEFAULT_ESL_PORT;
pub use dispatch::{handler_fn, EventHandler, HandlerFuture, HandlerRegistry};
pub use error::{EslError, EslResult};
pub use event::EslEvent;
pub use headers::{event_to_map, header_value, map_chan_data, url_decode, EventHeader};
pub use pool::{PooledSession, SessionPool};
pub use protocol::{Frame, FrameKind, FrameReader};
