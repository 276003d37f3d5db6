//! Customer support chat.
//!
//! A console page instantiates several of these stores in parallel, keyed by
//! the selected conversation, and wires their state straight into the UI:
//!
//! - **Conversations**: the shared inbox, following the live feed with
//!   coarse invalidation on updates.
//! - **Messages / internal notes**: per-conversation feeds, append-only.
//! - **Transfers**: reassignment history plus the two-phase transfer write.
//! - **Tags, welcome messages, teams, accounts**: plain fetch/refetch lists.
//! - **Audit**: append-only trail of account mutations, written best-effort.
//! - **Metrics**: full-scan aggregation over the support dataset.
//!
//! No store shares state with another; the platform is the only shared
//! resource.

pub mod accounts;
pub mod audit;
pub mod conversations;
pub mod messages;
pub mod metrics;
pub mod notes;
pub mod tags;
pub mod teams;
pub mod transfers;
pub mod welcome;

pub use accounts::{AccessLevel, AccountStore, SupportAccount, UpdateAccount};
pub use audit::{AuditAction, AuditEntry, AuditRecorder, AuditStore};
pub use conversations::{Conversation, ConversationStatus, ConversationStore, Priority};
pub use messages::{Message, MessageStore};
pub use metrics::{compute_support_metrics, load_support_metrics, SupportMetrics};
pub use notes::{InternalNote, NoteStore};
pub use tags::{ConversationTag, Tag, TagStore};
pub use teams::{SupportTeam, TeamMember, TeamRole, TeamStore};
pub use transfers::{ChatTransfer, TransferError, TransferStore};
pub use welcome::{WelcomeMessage, WelcomeStore};
