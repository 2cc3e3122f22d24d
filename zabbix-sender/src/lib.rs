//! A client for pushing item values to a [Zabbix][zabbix] trapper.
//!
//! [zabbix]: https://www.zabbix.com/documentation/current/en/manual/appendix/protocols/zabbix_sender
//!
//! # Usage
//!
//! Create a [`Sender`] with a [`SenderBuilder`], add items to its backlog, and send them:
//!
//! ```no_run
//! # use zabbix_sender::{Item, SenderBuilder};
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let sender = SenderBuilder::default()
//!     .with_host("zabbix.example.com")
//!     .with_ns(true)
//!     .build()?;
//!
//! sender
//!     .add_item(Item::new("app.requests", 1_024))?
//!     .add_item(Item::new("app.status", "ok").with_host("web01"))?;
//!
//! if let Some(report) = sender.send().await? {
//!     println!("trapper replied: {:?}", report.acknowledgement().info());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Wire format
//!
//! Each send opens a fresh connection, writes a single `ZBXD`-framed JSON request, and reads the trapper's reply until
//! it closes the connection. See the [`protocol`] module for the frame layout.
//!
//! # Backlog
//!
//! Items wait in an in-memory backlog until sent. Each send takes at most `max_per_send` items from the front of the
//! backlog. If the send fails, items from the batch that are still within `max_backlog_time` of the send's start time
//! are put back at the front of the backlog, ahead of anything added in the meantime, so that the next send retries
//! them. Freshness is judged by the item's clock, so when timestamps are disabled, items without an explicit clock are
//! dropped from a failed batch.
//!
//! The backlog lives in memory only and does not survive a restart.
//!
//! # Missing
//!
//! ## Encryption
//!
//! Connections are plaintext; TLS and PSK encryption are not supported.
//!
//! ## Compression
//!
//! Compressed (`ZBXD\x03`) frames are neither sent nor accepted.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod backlog;

mod builder;
pub use self::builder::{BuildError, SenderBuilder, SenderConfig};

mod error;
pub use self::error::{ItemError, ProtocolError, SendError};

mod item;
pub use self::item::{Item, Timestamp, Value};

pub mod protocol;
pub use self::protocol::{Acknowledgement, Summary};

mod sender;
pub use self::sender::{SendReport, Sender};

mod session;

mod transport;
pub use self::transport::{ConnectFuture, Connector, TcpConnector};
