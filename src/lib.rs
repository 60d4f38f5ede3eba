//! # notice-broker
//!
//! In-process notice broker between a mutable host object and its observers.
//!
//! A host emits native notices whenever it changes. A per-host [`Broker`]
//! translates them through dispatchers into broker notices and delivers them
//! to the host's [`NoticeCenter`]. While a transaction is open the broker
//! buffers notices instead; closing the outermost transaction merges each
//! mergeable type group into one notice and emits the consolidated set.
//!
//! ## Core Concepts
//!
//! - **Notice**: a typed unit of change information, mergeable or not
//! - **Transaction**: a scope during which notices are buffered, nestable
//! - **CapturePredicate**: filter deciding which notices a transaction keeps
//! - **Dispatcher**: extension turning native host notices into broker notices
//! - **Reporter**: extension reacting to broker notices
//! - **Framework**: process-scoped plugin table and per-host registries
//!
//! ## Usage
//!
//! ```rust
//! use notice_broker::{Broker, Framework, InMemoryHost, NoticeTransaction, ObjectsChanged};
//!
//! let framework = Framework::new();
//! let host = InMemoryHost::new();
//! let stream = Broker::create(&framework, &host)
//!     .subscribe::<ObjectsChanged>()
//!     .unwrap();
//!
//! {
//!     let _txn = NoticeTransaction::for_host(&framework, &host).unwrap();
//!     host.define("/World");
//!     host.define("/World/Cube");
//!     host.set_field("/World/Cube", "size", "2");
//! }
//!
//! let notices = stream.drain();
//! assert_eq!(notices.len(), 1);
//! assert!(notices[0].is_resynced("/World/Cube"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Notices and delivery
pub mod center;
pub mod error;
pub mod host;
pub mod notice;
pub mod predicate;

// Transactions
pub mod broker;

// Extensions and per-host state
pub mod collector;
pub mod config;
pub mod dispatcher;
pub mod framework;
pub mod plugin;
pub mod registry;
pub mod reporter;

pub use broker::{Broker, NoticeTransaction};
pub use center::{ListenerKey, ListenerKeys, NoticeCenter, NoticeStream};
pub use collector::{Collector, Extension, Upcast};
pub use config::FrameworkConfig;
pub use dispatcher::{BrokerRef, Dispatcher, DispatcherBase, DispatcherFactory, HostDispatcher};
pub use error::{BrokerError, BrokerResult, PluginError};
pub use framework::Framework;
pub use host::{ContentsEdited, Host, HostRef, InMemoryHost, ObjectsEdited};
pub use notice::{AnyNotice, ContentsChanged, Notice, NoticeTag, ObjectsChanged};
pub use plugin::{ExtensionFactory, Plugin, PluginEntry, PluginRegistry};
pub use predicate::CapturePredicate;
pub use registry::{Handle, Registry, RegistryEntry};
pub use reporter::{Inspector, Reporter, ReporterBase, ReporterFactory, ReporterManager};
