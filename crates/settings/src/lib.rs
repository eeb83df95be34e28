//! Client-local settings for zher.
//!
//! Key-value storage and the persistent session id, theme, layout state,
//! name editing, share QR codes, alerts, and the configuration file.

pub mod alerts;
pub mod config;
pub mod layout;
pub mod name_edit;
pub mod qr;
pub mod storage;
pub mod theme;

pub use alerts::{Alert, AlertQueue};
pub use config::{ClientConfig, ConfigError};
pub use layout::{InputStyle, LayoutState, PanelView};
pub use name_edit::{NameEditor, SaveOutcome};
pub use qr::{QrError, QrImage, share_url};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore, StorageError, session_id};
pub use theme::Theme;
