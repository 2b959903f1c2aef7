//! Public lead forms: contact, quote request, guide download.
//!
//! Only input validation can fail a submission. Once a lead is valid, every
//! store and CRM failure is logged and the visitor still gets a thank-you.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use ecospray_shared::{Result, SiteError};
use ecospray_storage::{Table, TabularStore};

use crate::crm::{CrmClient, CrmContact};
use crate::writer::append_event;

/// Message returned for every accepted submission.
pub const THANK_YOU: &str = "Thank you! We'll be in touch within one business day.";

/// Which public form was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    Contact,
    Quote,
    GuideDownload,
}

impl FormKind {
    /// Tag stamped on the contact row.
    pub fn tag(&self) -> &'static str {
        match self {
            FormKind::Contact => "contact-form",
            FormKind::Quote => "quote-request",
            FormKind::GuideDownload => "guide-download",
        }
    }

    fn activity_type(&self) -> &'static str {
        match self {
            FormKind::Contact => "form_submission",
            FormKind::Quote => "quote_request",
            FormKind::GuideDownload => "guide_download",
        }
    }
}

/// Raw form body as posted by the website.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadForm {
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub address: Option<String>,
    pub service: Option<String>,
    pub message: Option<String>,
    pub guide: Option<String>,
}

/// A validated lead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lead {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub address: String,
    pub service: String,
    pub message: String,
}

/// What happened to each side effect of an accepted lead.
#[derive(Debug, Clone, Serialize)]
pub struct LeadOutcome {
    pub contact_id: String,
    pub contact_saved: bool,
    pub activity_saved: bool,
    pub event_saved: bool,
    /// `None` when no CRM is configured.
    pub crm_synced: Option<bool>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

impl LeadForm {
    /// Check required fields and split the name.
    pub fn validate(&self, kind: FormKind) -> Result<Lead> {
        let (first_name, last_name) = match (non_empty(&self.first_name), non_empty(&self.name)) {
            (Some(first), _) => (first, non_empty(&self.last_name).unwrap_or_default()),
            (None, Some(name)) => split_name(&name),
            (None, None) => return Err(SiteError::validation("name is required")),
        };

        let email = non_empty(&self.email).ok_or_else(|| SiteError::validation("email is required"))?;
        if !email.contains('@') {
            return Err(SiteError::validation("email is invalid"));
        }

        let mut message = non_empty(&self.message).unwrap_or_default();
        if kind == FormKind::GuideDownload {
            if let Some(guide) = non_empty(&self.guide) {
                if !message.is_empty() {
                    message.push('\n');
                }
                message.push_str(&format!("Requested guide: {guide}"));
            }
        }

        Ok(Lead {
            first_name,
            last_name,
            email: email.to_ascii_lowercase(),
            phone: non_empty(&self.phone).unwrap_or_default(),
            company: non_empty(&self.company).unwrap_or_default(),
            address: non_empty(&self.address).unwrap_or_default(),
            service: non_empty(&self.service).unwrap_or_default(),
            message,
        })
    }
}

/// First word, then the rest.
pub fn split_name(name: &str) -> (String, String) {
    let mut parts = name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let rest = parts.collect::<Vec<_>>().join(" ");
    (first, rest)
}

/// Store an accepted lead and sync it to the CRM.
///
/// The contact row, activity row, event row and CRM upsert run concurrently;
/// none of them can fail the call.
#[instrument(skip_all, fields(form = kind.tag()))]
pub async fn record_lead(
    store: &dyn TabularStore,
    crm: Option<&CrmClient>,
    source_tag: &str,
    kind: FormKind,
    lead: &Lead,
) -> LeadOutcome {
    let contact_id = Uuid::now_v7().to_string();
    let now = Utc::now().to_rfc3339();
    let tags = vec!["lead".to_string(), source_tag.to_string(), kind.tag().to_string()];

    let contact_row = vec![
        contact_id.clone(),
        lead.first_name.clone(),
        lead.last_name.clone(),
        lead.email.clone(),
        lead.phone.clone(),
        lead.company.clone(),
        lead.address.clone(),
        lead.service.clone(),
        lead.message.clone(),
        source_tag.to_string(),
        tags.join(", "),
        now.clone(),
    ];

    let activity_row = vec![
        Uuid::now_v7().to_string(),
        contact_id.clone(),
        kind.activity_type().to_string(),
        format!(
            "{} {} submitted the {} form",
            lead.first_name,
            lead.last_name,
            kind.tag()
        )
        .replace("  ", " "),
        now,
    ];

    let payload = json!({
        "contact_id": contact_id,
        "email": lead.email,
        "form": kind.tag(),
    });

    let crm_contact = CrmContact {
        email: lead.email.clone(),
        first_name: lead.first_name.clone(),
        last_name: lead.last_name.clone(),
        phone: Some(lead.phone.clone()).filter(|p| !p.is_empty()),
        company: Some(lead.company.clone()).filter(|c| !c.is_empty()),
        source: source_tag.to_string(),
        tags,
    };

    let (contact, activity, event, crm_result) = tokio::join!(
        store.append_rows(Table::Contacts, std::slice::from_ref(&contact_row)),
        store.append_rows(Table::Activities, std::slice::from_ref(&activity_row)),
        append_event(store, "lead.created", source_tag, &payload),
        async {
            match crm {
                Some(crm) => Some(crm.upsert_contact(&crm_contact).await),
                None => None,
            }
        },
    );

    if let Err(e) = &contact {
        warn!(error = %e, email = %lead.email, "lead contact row not saved");
    }
    if let Err(e) = &activity {
        warn!(error = %e, "lead activity row not saved");
    }
    if let Err(e) = &event {
        warn!(error = %e, "lead event row not saved");
    }
    if let Some(Err(e)) = &crm_result {
        warn!(error = %e, "CRM sync failed");
    }

    let outcome = LeadOutcome {
        contact_id,
        contact_saved: contact.is_ok(),
        activity_saved: activity.is_ok(),
        event_saved: event.is_ok(),
        crm_synced: crm_result.map(|r| r.is_ok()),
    };
    info!(
        contact_saved = outcome.contact_saved,
        crm_synced = ?outcome.crm_synced,
        "lead recorded"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecospray_shared::CrmConfig;
    use ecospray_storage::LocalStore;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_store() -> LocalStore {
        let tmp = std::env::temp_dir().join(format!("ecospray_leads_{}.db", Uuid::now_v7()));
        LocalStore::open(&tmp).await.expect("open test db")
    }

    fn jane() -> LeadForm {
        LeadForm {
            name: Some("Jane Doe".into()),
            email: Some("jane@x.com".into()),
            ..LeadForm::default()
        }
    }

    #[test]
    fn splits_first_word_from_rest() {
        assert_eq!(split_name("Jane Doe"), ("Jane".into(), "Doe".into()));
        assert_eq!(
            split_name("  Mary Ann  van Dyke "),
            ("Mary".into(), "Ann van Dyke".into())
        );
        assert_eq!(split_name("Cher"), ("Cher".into(), String::new()));
    }

    #[test]
    fn first_name_field_is_accepted() {
        let form: LeadForm = serde_json::from_str(
            r#"{"firstName": "Jane", "lastName": "Doe", "email": "Jane@X.com"}"#,
        )
        .unwrap();
        let lead = form.validate(FormKind::Quote).unwrap();
        assert_eq!(lead.first_name, "Jane");
        assert_eq!(lead.last_name, "Doe");
        assert_eq!(lead.email, "jane@x.com");
    }

    #[test]
    fn missing_fields_are_named() {
        let no_name = LeadForm {
            email: Some("jane@x.com".into()),
            ..LeadForm::default()
        };
        assert_eq!(
            no_name.validate(FormKind::Contact).unwrap_err().to_string(),
            "name is required"
        );

        let no_email = LeadForm {
            name: Some("Jane".into()),
            ..LeadForm::default()
        };
        assert_eq!(
            no_email.validate(FormKind::Contact).unwrap_err().to_string(),
            "email is required"
        );
    }

    #[test]
    fn guide_name_lands_in_message() {
        let form = LeadForm {
            guide: Some("Attic Insulation Buyer's Guide".into()),
            ..jane()
        };
        let lead = form.validate(FormKind::GuideDownload).unwrap();
        assert_eq!(lead.message, "Requested guide: Attic Insulation Buyer's Guide");
    }

    #[tokio::test]
    async fn contact_form_writes_contact_activity_and_event() {
        let store = test_store().await;
        let lead = jane().validate(FormKind::Contact).unwrap();

        let outcome = record_lead(&store, None, "ecospray-website", FormKind::Contact, &lead).await;
        assert!(outcome.contact_saved && outcome.activity_saved && outcome.event_saved);
        assert_eq!(outcome.crm_synced, None);

        let contacts = store.read_rows(Table::Contacts).await.unwrap();
        assert_eq!(contacts.len(), 1);
        let contact = Table::Contacts.to_record(&contacts[0]);
        assert_eq!(contact["first_name"], "Jane");
        assert_eq!(contact["last_name"], "Doe");
        assert_eq!(contact["email"], "jane@x.com");
        let tags = contact["tags"].as_str().unwrap();
        assert!(tags.contains("lead"));
        assert!(tags.contains("ecospray-website"));
        assert!(tags.contains("contact-form"));

        let activities = store.read_rows(Table::Activities).await.unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0][1], outcome.contact_id);

        let events = store.read_rows(Table::Events).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0][1], "lead.created");
    }

    #[tokio::test]
    async fn crm_failure_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contacts/upsert"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        let crm = CrmClient::from_config(&CrmConfig {
            base_url: Some(server.uri()),
            ..CrmConfig::default()
        })
        .unwrap()
        .unwrap();

        let store = test_store().await;
        let lead = jane().validate(FormKind::Quote).unwrap();
        let outcome =
            record_lead(&store, Some(&crm), "ecospray-website", FormKind::Quote, &lead).await;

        assert_eq!(outcome.crm_synced, Some(false));
        assert!(outcome.contact_saved);
    }
}
