//! One webhook-triggered update: resolve fields, patch the page, push once.
//!
//! Every entity kind has one wiki page, `partials-<kind>`, holding one marked
//! region per configured field. An update fetches (or creates) that page,
//! rewrites the regions for the configured fields and pushes the body back.
//! Nothing is pushed unless every field resolved and every patch succeeded.

use std::time::Instant;

use tracing::{debug, info, instrument};

use netwiki_confluence::PageStore;
use netwiki_fields::FieldRegistry;
use netwiki_patcher::{PageDocument, patch_field};
use netwiki_shared::{Result, WebhookPayload};

/// Title prefix of the per-entity-kind pages.
pub const PAGE_TITLE_PREFIX: &str = "partials-";

/// Title of the page holding the regions for `entity_kind`.
pub fn page_title(entity_kind: &str) -> String {
    format!("{PAGE_TITLE_PREFIX}{entity_kind}")
}

// ---------------------------------------------------------------------------
// Update report
// ---------------------------------------------------------------------------

/// What one [`UpdateOrchestrator::apply_update`] call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    /// Page the entity kind maps to.
    pub page_title: String,
    /// Remote page id; `None` when nothing was fetched.
    pub page_id: Option<String>,
    /// Regions synthesized by this update, in registry order.
    pub created: Vec<String>,
    /// Existing regions rewritten by this update, in registry order.
    pub updated: Vec<String>,
    /// Whether the page body was pushed.
    pub pushed: bool,
}

impl UpdateReport {
    fn skipped(page_title: String) -> Self {
        Self {
            page_title,
            page_id: None,
            created: Vec::new(),
            updated: Vec::new(),
            pushed: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Applies webhook payloads to wiki pages.
///
/// Holds no per-update state; concurrent updates each own their document.
#[derive(Debug)]
pub struct UpdateOrchestrator<S> {
    registry: FieldRegistry,
    store: S,
}

impl<S: PageStore> UpdateOrchestrator<S> {
    pub fn new(registry: FieldRegistry, store: S) -> Self {
        Self { registry, store }
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one update for `payload`.
    ///
    /// 1. Resolve the configured fields and extract their values
    /// 2. Fetch (or create) the `partials-<kind>` page
    /// 3. Locate-or-create and set each field's region, in registry order
    /// 4. Push the body once
    ///
    /// Field and value errors abort before any remote call.
    #[instrument(skip_all, fields(model = %payload.model, request_id = ?payload.request_id))]
    pub async fn apply_update(&self, payload: &WebhookPayload) -> Result<UpdateReport> {
        let start = Instant::now();
        let title = page_title(&payload.model);

        let fields = self.registry.resolve_fields(payload)?;
        if fields.is_empty() {
            info!(%title, "no fields configured for entity kind, nothing to update");
            return Ok(UpdateReport::skipped(title));
        }

        let values = fields
            .iter()
            .map(|field| -> Result<_> { Ok((field.display_name(), field.extract_value()?)) })
            .collect::<Result<Vec<_>>>()?;

        let page = self.store.fetch_or_create(&title).await?;
        let mut doc = PageDocument::from_storage_body(&page.body)?;

        let mut report = UpdateReport {
            page_title: title,
            page_id: Some(page.id.clone()),
            created: Vec::new(),
            updated: Vec::new(),
            pushed: false,
        };

        for (name, value) in &values {
            let outcome = patch_field(&mut doc, name, value)?;
            debug!(
                field = name,
                created = outcome.created,
                matches = outcome.matches,
                changed = outcome.changed,
                "patched region"
            );
            if outcome.created {
                report.created.push(name.to_string());
            } else {
                report.updated.push(name.to_string());
            }
        }

        self.store
            .push(&page.id, &page.title, &doc.to_storage_body())
            .await?;
        report.pushed = true;

        info!(
            page_id = %page.id,
            created = report.created.len(),
            updated = report.updated.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "update pushed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netwiki_confluence::{MemoryPageStore, PageContent};
    use netwiki_patcher::locate_region;
    use netwiki_shared::{FieldKind, FieldMapping, NetWikiError};
    use serde_json::{Value, json};

    fn mapping(model: &str, field: &str, kind: FieldKind, custom: bool) -> FieldMapping {
        FieldMapping {
            model: model.into(),
            field: field.into(),
            kind,
            custom,
        }
    }

    fn site_registry() -> FieldRegistry {
        let mut builder = FieldRegistry::builder();
        builder
            .register_all([
                mapping("site", "status", FieldKind::LabelProjection, false),
                mapping("site", "description", FieldKind::PlainText, false),
                mapping("site", "purpose", FieldKind::PlainText, true),
            ])
            .unwrap();
        builder.build()
    }

    fn site_orchestrator() -> UpdateOrchestrator<MemoryPageStore> {
        UpdateOrchestrator::new(site_registry(), MemoryPageStore::new())
    }

    /// Serves pages from memory but refuses every push.
    struct RejectingStore {
        inner: MemoryPageStore,
    }

    impl PageStore for RejectingStore {
        async fn fetch_or_create(&self, title: &str) -> Result<PageContent> {
            self.inner.fetch_or_create(title).await
        }

        async fn push(&self, page_id: &str, _title: &str, _body: &str) -> Result<()> {
            Err(NetWikiError::RemoteWrite(format!(
                "PUT /rest/api/content/{page_id}: HTTP 409: version conflict"
            )))
        }
    }

    fn payload(value: Value) -> WebhookPayload {
        WebhookPayload::from_value(value).unwrap()
    }

    fn site_payload(status: &str) -> WebhookPayload {
        payload(json!({
            "model": "site",
            "data": {
                "name": "Office",
                "status": {"value": "active", "label": status},
                "description": "Office 1",
                "custom_fields": {"purpose": "Lab"}
            }
        }))
    }

    fn pushed_body(orchestrator: &UpdateOrchestrator<MemoryPageStore>, title: &str) -> String {
        orchestrator.store().page(title).expect("page exists").body
    }

    fn region_count(body: &str) -> usize {
        body.matches("ac:name=\"MultiExcerptName\"").count()
    }

    #[test]
    fn page_title_uses_partials_prefix() {
        assert_eq!(page_title("site"), "partials-site");
        assert_eq!(page_title("dcim.device"), "partials-dcim.device");
    }

    // -----------------------------------------------------------------------
    // Scenario
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn first_update_creates_all_regions() {
        let orchestrator = site_orchestrator();
        let report = orchestrator.apply_update(&site_payload("Active")).await.unwrap();

        assert_eq!(report.page_title, "partials-site");
        assert_eq!(report.created, ["status", "description", "custom_purpose"]);
        assert!(report.updated.is_empty());
        assert!(report.pushed);
        assert_eq!(orchestrator.store().push_count(), 1);

        let body = pushed_body(&orchestrator, "partials-site");
        assert_eq!(region_count(&body), 3);
        for value in ["<p>Active</p>", "<p>Office 1</p>", "<p>Lab</p>"] {
            assert!(body.contains(value), "missing {value} in {body}");
        }

        let doc = PageDocument::from_storage_body(&body).unwrap();
        for name in ["status", "description", "custom_purpose"] {
            assert_eq!(locate_region(&doc, name).map(|r| r.matches()), Some(1), "{name}");
        }
        assert!(locate_region(&doc, "purpose").is_none());
    }

    #[tokio::test]
    async fn second_update_rewrites_without_duplicating() {
        let orchestrator = site_orchestrator();
        orchestrator.apply_update(&site_payload("Active")).await.unwrap();
        let report = orchestrator.apply_update(&site_payload("Planned")).await.unwrap();

        assert!(report.created.is_empty());
        assert_eq!(report.updated, ["status", "description", "custom_purpose"]);
        assert_eq!(orchestrator.store().push_count(), 2);

        let body = pushed_body(&orchestrator, "partials-site");
        assert_eq!(region_count(&body), 3);
        assert!(body.contains("<p>Planned</p>"));
        assert!(!body.contains("<p>Active</p>"));
    }

    #[tokio::test]
    async fn repeated_identical_update_is_stable() {
        let orchestrator = site_orchestrator();
        orchestrator.apply_update(&site_payload("Active")).await.unwrap();
        let first = pushed_body(&orchestrator, "partials-site");
        orchestrator.apply_update(&site_payload("Active")).await.unwrap();
        assert_eq!(pushed_body(&orchestrator, "partials-site"), first);
    }

    #[tokio::test]
    async fn existing_page_content_is_preserved() {
        let body = std::fs::read_to_string("../../../fixtures/storage/partials-site.xml")
            .expect("fixture");
        let orchestrator = site_orchestrator();
        orchestrator.store().insert("partials-site", body.clone());

        let report = orchestrator.apply_update(&site_payload("Planned")).await.unwrap();
        assert_eq!(report.created, ["custom_purpose"]);
        assert_eq!(report.updated, ["status", "description"]);

        let pushed = pushed_body(&orchestrator, "partials-site");
        assert!(pushed.contains("<p>Planned</p>"));
        assert!(pushed.ends_with(body.rsplit_once("<p><em>").map(|(_, tail)| tail).unwrap()));
        assert_eq!(
            pushed.split("<ac:structured-macro").next(),
            body.split("<ac:structured-macro").next(),
            "content before the first region changed"
        );
    }

    // -----------------------------------------------------------------------
    // Failures abort before any remote call
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn missing_field_aborts_before_remote_calls() {
        let orchestrator = site_orchestrator();
        let err = orchestrator
            .apply_update(&payload(json!({
                "model": "site",
                "data": {
                    "status": {"label": "Active"},
                    "custom_fields": {"purpose": "Lab"}
                }
            })))
            .await
            .unwrap_err();

        assert!(
            matches!(err, NetWikiError::UnknownFieldMapping { ref field, custom: false, .. } if field == "description"),
            "got {err}"
        );
        assert_eq!(orchestrator.store().fetch_count(), 0);
        assert_eq!(orchestrator.store().push_count(), 0);
    }

    #[tokio::test]
    async fn custom_field_is_not_found_in_data() {
        let orchestrator = site_orchestrator();
        let err = orchestrator
            .apply_update(&payload(json!({
                "model": "site",
                "data": {
                    "status": {"label": "Active"},
                    "description": "Office 1",
                    "purpose": "Lab",
                    "custom_fields": {}
                }
            })))
            .await
            .unwrap_err();

        assert!(matches!(err, NetWikiError::UnknownFieldMapping { custom: true, .. }), "got {err}");
        assert_eq!(orchestrator.store().fetch_count(), 0);
    }

    #[tokio::test]
    async fn malformed_value_aborts_before_remote_calls() {
        let orchestrator = site_orchestrator();
        let err = orchestrator
            .apply_update(&payload(json!({
                "model": "site",
                "data": {
                    "status": "active",
                    "description": "Office 1",
                    "custom_fields": {"purpose": "Lab"}
                }
            })))
            .await
            .unwrap_err();

        assert!(matches!(err, NetWikiError::MalformedValue { .. }), "got {err}");
        assert_eq!(orchestrator.store().fetch_count(), 0);
    }

    #[tokio::test]
    async fn rejected_push_fails_the_update() {
        let orchestrator = UpdateOrchestrator::new(
            site_registry(),
            RejectingStore {
                inner: MemoryPageStore::new(),
            },
        );
        orchestrator
            .store()
            .inner
            .insert("partials-site", "<p>kept</p>");

        let err = orchestrator.apply_update(&site_payload("Active")).await.unwrap_err();
        assert!(matches!(err, NetWikiError::RemoteWrite(ref m) if m.contains("409")), "got {err}");
        assert_eq!(orchestrator.store().inner.fetch_count(), 1);
        assert_eq!(
            orchestrator.store().inner.page("partials-site").unwrap().body,
            "<p>kept</p>"
        );
    }

    #[tokio::test]
    async fn control_character_in_value_aborts_before_remote_calls() {
        let orchestrator = site_orchestrator();
        let err = orchestrator
            .apply_update(&payload(json!({
                "model": "site",
                "data": {
                    "status": {"label": "Active"},
                    "description": "Office\u{1} 1",
                    "custom_fields": {"purpose": "Lab"}
                }
            })))
            .await
            .unwrap_err();

        assert!(matches!(err, NetWikiError::MalformedValue { .. }), "got {err}");
        assert_eq!(orchestrator.store().fetch_count(), 0);
    }

    #[tokio::test]
    async fn unparseable_page_is_not_pushed() {
        let orchestrator = site_orchestrator();
        orchestrator.store().insert("partials-site", "<p>unclosed");

        let err = orchestrator.apply_update(&site_payload("Active")).await.unwrap_err();
        assert!(matches!(err, NetWikiError::DocumentParse { .. }), "got {err}");
        assert_eq!(orchestrator.store().push_count(), 0);
        assert_eq!(pushed_body(&orchestrator, "partials-site"), "<p>unclosed");
    }

    #[tokio::test]
    async fn unconfigured_kind_makes_no_remote_calls() {
        let orchestrator = site_orchestrator();
        let report = orchestrator
            .apply_update(&payload(json!({
                "model": "device",
                "data": {"name": "sw1", "custom_fields": {}}
            })))
            .await
            .unwrap();

        assert_eq!(report.page_title, "partials-device");
        assert_eq!(report.page_id, None);
        assert!(!report.pushed);
        assert_eq!(orchestrator.store().fetch_count(), 0);
        assert!(orchestrator.store().is_empty());
    }

    #[tokio::test]
    async fn plain_and_custom_fields_with_one_name_stay_apart() {
        let mut builder = FieldRegistry::builder();
        builder
            .register_all([
                mapping("site", "purpose", FieldKind::PlainText, false),
                mapping("site", "purpose", FieldKind::PlainText, true),
            ])
            .unwrap();
        let orchestrator = UpdateOrchestrator::new(builder.build(), MemoryPageStore::new());

        let report = orchestrator
            .apply_update(&payload(json!({
                "model": "site",
                "data": {"purpose": "plain", "custom_fields": {"purpose": "custom"}}
            })))
            .await
            .unwrap();
        assert_eq!(report.created, ["purpose", "custom_purpose"]);

        let body = pushed_body(&orchestrator, "partials-site");
        assert!(body.contains(">purpose</ac:parameter>"));
        assert!(body.contains(">custom_purpose</ac:parameter>"));
        assert!(body.contains("<p>plain</p>"));
        assert!(body.contains("<p>custom</p>"));
    }
}
