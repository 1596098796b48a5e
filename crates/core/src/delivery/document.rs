use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use tera::{Context, Tera};
use tracing::debug;

use crate::domain::request::{Request, SignatureImage, Stage};
use crate::flows::effects::{DocumentRenderer, EffectError};
use crate::flows::states::DocumentRequest;

const TEMPLATE_NAME: &str = "approval_form.html";

#[derive(Clone, Debug, Serialize)]
struct SignatureSlot {
    label: &'static str,
    image: Option<String>,
    name: String,
    position: String,
    signed_at: String,
}

/// Renders the approval form as HTML, optionally keeping a copy per request on disk.
#[derive(Clone, Debug)]
pub struct TeraDocumentRenderer {
    tera: Tera,
    output_dir: Option<PathBuf>,
}

impl TeraDocumentRenderer {
    pub fn new(output_dir: Option<PathBuf>) -> Result<Self, EffectError> {
        let mut tera = Tera::default();
        tera.add_raw_template(
            TEMPLATE_NAME,
            include_str!("../../../../templates/approval_form.html"),
        )
        .map_err(|error| EffectError::Render(error.to_string()))?;
        Ok(Self { tera, output_dir })
    }

    pub fn render_html(&self, document: &DocumentRequest) -> Result<String, EffectError> {
        let mut context = Context::new();
        context.insert("request", &document.request);
        context.insert("slots", &signature_slots(document));
        self.tera
            .render(TEMPLATE_NAME, &context)
            .map_err(|error| EffectError::Render(error.to_string()))
    }
}

#[async_trait]
impl DocumentRenderer for TeraDocumentRenderer {
    async fn render(&self, document: &DocumentRequest) -> Result<Vec<u8>, EffectError> {
        let html = self.render_html(document)?;
        if let Some(dir) = &self.output_dir {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|error| EffectError::Render(error.to_string()))?;
            let path = dir.join(format!("{}.html", document.request.id));
            tokio::fs::write(&path, html.as_bytes())
                .await
                .map_err(|error| EffectError::Render(error.to_string()))?;
            debug!(
                event_name = "effects.render.stored",
                request_id = %document.request.id,
                path = %path.display(),
                "approval form written"
            );
        }
        Ok(html.into_bytes())
    }
}

fn signature_slots(document: &DocumentRequest) -> Vec<SignatureSlot> {
    let request = &document.request;
    let signatures = &document.signatures;
    let mut slots = vec![SignatureSlot {
        label: "Requester",
        image: image(signatures.requester.as_ref()),
        name: request.requester.name.clone(),
        position: request.requester.department.clone(),
        signed_at: request.created_at.format("%Y-%m-%d").to_string(),
    }];

    let stages = [
        ("Executive", Stage::Executive, signatures.executive.as_ref()),
        ("Manager", Stage::Manager, signatures.manager.as_ref()),
        ("HR", Stage::Hr, signatures.hr.as_ref()),
        ("Accounting", Stage::Accounting, signatures.accounting.as_ref()),
    ];
    for (label, stage, signature) in stages {
        if stage == Stage::Executive && request.executive_id.is_none() {
            continue;
        }
        slots.push(stage_slot(request, label, stage, signature));
    }
    slots
}

fn stage_slot(
    request: &Request,
    label: &'static str,
    stage: Stage,
    signature: Option<&SignatureImage>,
) -> SignatureSlot {
    match request.stamp(stage) {
        Some(stamp) => SignatureSlot {
            label,
            image: image(signature),
            name: stamp.approver_name.clone(),
            position: stamp.approver_position.clone(),
            signed_at: stamp.decided_at.format("%Y-%m-%d").to_string(),
        },
        None => SignatureSlot {
            label,
            image: None,
            name: String::new(),
            position: String::new(),
            signed_at: String::new(),
        },
    }
}

fn image(signature: Option<&SignatureImage>) -> Option<String> {
    signature.filter(|image| !image.is_blank()).map(|image| image.0.clone())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::TeraDocumentRenderer;
    use crate::domain::action::Decision;
    use crate::domain::request::{RequestStatus, RequestType, Stage, StageStamp};
    use crate::flows::effects::DocumentRenderer;
    use crate::flows::states::DocumentRequest;
    use crate::test_support::{base_time, request, signature};

    fn document() -> DocumentRequest {
        let mut pending = request("REQ-7", "E-1", RequestType::Wedding, RequestStatus::PendingHr);
        pending.stamps.insert(
            Stage::Manager,
            StageStamp {
                approver_id: "M-1".to_owned(),
                approver_name: "Somchai".to_owned(),
                approver_position: "Team lead".to_owned(),
                decision: Decision::Approve,
                decided_at: base_time(),
                signature: Some(signature("M-1")),
                note: None,
            },
        );
        DocumentRequest { signatures: pending.signatures(), request: pending }
    }

    #[test]
    fn form_lists_requester_and_stamped_approvers() {
        let renderer = TeraDocumentRenderer::new(None).expect("template loads");
        let html = renderer.render_html(&document()).expect("render");

        assert!(html.contains("REQ-7"));
        assert!(html.contains("Somchai"));
        assert!(html.contains("Employee E-1"));
        assert!(html.contains("2026-03-02"));
        assert!(!html.contains(">Executive<"), "no executive assigned");
    }

    #[tokio::test]
    async fn render_writes_a_copy_when_output_dir_is_set() {
        let dir = TempDir::new().expect("temp dir");
        let renderer =
            TeraDocumentRenderer::new(Some(dir.path().to_path_buf())).expect("template loads");

        let bytes = renderer.render(&document()).await.expect("render");
        let stored = std::fs::read(dir.path().join("REQ-7.html")).expect("stored copy");
        assert_eq!(bytes, stored);
    }
}
