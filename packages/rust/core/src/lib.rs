//! Domain logic for the EcoSpray backend.
//!
//! This crate ties the source readers, the Gemini client and the tabular store
//! into the site-import stages, and implements lead capture and copy drafting.

pub mod copywriter;
pub mod crm;
pub mod extraction;
pub mod gemini;
pub mod import;
pub mod leads;
pub mod writer;

pub use copywriter::{CopyKind, draft_copy};
pub use crm::{CrmClient, CrmContact};
pub use extraction::{ContentExtractor, SourceData};
pub use gemini::{GeminiClient, ResponseMode};
pub use import::{Destination, ImportService, WriteOutcome};
pub use leads::{FormKind, Lead, LeadForm, LeadOutcome, THANK_YOU, record_lead};
pub use writer::{WriteReport, upsert_site_config, write_imported_content};
