//! callerid core library: domain types, wire payloads, caller list store,
//! config and mode resolution.
//!
//! - [`types`] and [`contact`]: newtypes and domain structs
//! - [`payload`]: strict decode of `setCallerList` / `syncContacts` requests
//! - [`caller_store`]: durable allow/block lists
//! - [`config`], [`mode`], [`paths`]: `~/.callerid/` layout and settings

pub mod caller_store;
pub mod config;
pub mod contact;
pub mod error;
pub mod mode;
pub mod paths;
pub mod payload;
pub mod types;

pub use caller_store::{CallerListStore, EmptyReason, LoadResult, SaveOutcome};
pub use config::{BatchConfig, CallerIdConfig};
pub use contact::{ContactEmail, ContactPhone, ContactRecord, EmailType, PhoneType};
pub use error::{PayloadError, StoreError};
pub use mode::{DeviceProfile, ModeFlags, ModeSetting};
pub use payload::{
    CallerItem, CallerListPayload, CallerListType, ContactItem, ContactSyncPayload, ProtoContact,
};
pub use types::{
    CallerIdMode, CallerLookup, CallerRecord, Classification, GroupId, PhoneNumber, RawContactId,
    SourceId,
};
