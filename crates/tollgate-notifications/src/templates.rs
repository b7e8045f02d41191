use std::collections::HashMap;

use time::format_description::well_known::Rfc2822;
use tollgate_auth::{SubjectKind, VerificationMessage};

use crate::error::NotificationError;

/// Rendered email content.
#[derive(Debug, Clone)]
pub struct RenderedContent {
    pub subject: String,
    pub body: String,
    pub html_body: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Template {
    pub id: String,
    pub subject: String,
    pub body: String,
    pub html_body: Option<String>,
}

/// Simple template renderer using {{variable}} syntax
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    templates: HashMap<String, Template>,
}

const PLAIN_BODY: &str = "Hello {{username}},

Your verification code is: {{code}}

It expires at {{expires_at}}. If you did not request this code, you can ignore this email.
";

const HTML_BODY: &str = r#"<html>
  <body style="font-family: sans-serif">
    <p>Hello {{username}},</p>
    <p>Your verification code is:</p>
    <p style="font-size: 28px; letter-spacing: 6px"><strong>{{code}}</strong></p>
    <p>It expires at {{expires_at}}. If you did not request this code, you can ignore this email.</p>
  </body>
</html>
"#;

impl TemplateRenderer {
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Renderer with a verification template for every subject kind.
    pub fn with_defaults() -> Self {
        let mut renderer = Self::new();
        for (kind, subject) in [
            (SubjectKind::StudentTemp, "Verify your student account"),
            (SubjectKind::TeacherTemp, "Verify your teacher account"),
            (SubjectKind::AdminTemp, "Verify your administrator account"),
            (SubjectKind::User, "Confirm your email address"),
        ] {
            renderer.register(Template {
                id: template_id(kind),
                subject: subject.to_string(),
                body: PLAIN_BODY.to_string(),
                html_body: Some(HTML_BODY.to_string()),
            });
        }
        renderer
    }

    pub fn register(&mut self, template: Template) {
        self.templates.insert(template.id.clone(), template);
    }

    pub fn get(&self, template_id: &str) -> Option<&Template> {
        self.templates.get(template_id)
    }

    pub fn render(
        &self,
        template_id: &str,
        data: &HashMap<String, serde_json::Value>,
    ) -> Result<RenderedContent, NotificationError> {
        let template = self
            .templates
            .get(template_id)
            .ok_or_else(|| NotificationError::TemplateNotFound(template_id.to_string()))?;

        Ok(RenderedContent {
            subject: render_string(&template.subject, data),
            body: render_string(&template.body, data),
            html_body: template
                .html_body
                .as_ref()
                .map(|s| render_string(s, data)),
        })
    }

    /// Renders the verification email for `message`.
    pub fn render_verification(
        &self,
        message: &VerificationMessage,
    ) -> Result<RenderedContent, NotificationError> {
        let expires_at = message
            .expires_at
            .format(&Rfc2822)
            .unwrap_or_else(|_| message.expires_at.to_string());

        let mut data = HashMap::new();
        data.insert("username".to_string(), serde_json::json!(message.username));
        data.insert("code".to_string(), serde_json::json!(message.code));
        data.insert("expires_at".to_string(), serde_json::json!(expires_at));
        self.render(&template_id(message.kind), &data)
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn template_id(kind: SubjectKind) -> String {
    format!("verification.{kind}")
}

fn render_string(template: &str, data: &HashMap<String, serde_json::Value>) -> String {
    let mut result = template.to_string();

    for (key, value) in data {
        let placeholder = format!("{{{{{}}}}}", key);
        let replacement = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            _ => value.to_string(),
        };
        result = result.replace(&placeholder, &replacement);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn message(kind: SubjectKind) -> VerificationMessage {
        VerificationMessage {
            to: "alice@school.test".to_string(),
            username: "alice".to_string(),
            kind,
            code: "042613".to_string(),
            expires_at: datetime!(2024-03-01 13:00 UTC),
        }
    }

    #[test]
    fn test_render_verification() {
        let renderer = TemplateRenderer::with_defaults();
        let content = renderer
            .render_verification(&message(SubjectKind::StudentTemp))
            .unwrap();

        assert_eq!(content.subject, "Verify your student account");
        assert!(content.body.contains("Hello alice,"));
        assert!(content.body.contains("042613"));
        assert!(content.body.contains("Fri, 01 Mar 2024 13:00:00 +0000"));
        assert!(!content.body.contains("{{"));
        assert!(content.html_body.unwrap().contains("<strong>042613</strong>"));
    }

    #[test]
    fn test_every_kind_has_a_template() {
        let renderer = TemplateRenderer::default();
        for kind in [
            SubjectKind::StudentTemp,
            SubjectKind::TeacherTemp,
            SubjectKind::AdminTemp,
            SubjectKind::User,
        ] {
            assert!(renderer.render_verification(&message(kind)).is_ok());
        }
    }

    #[test]
    fn test_template_not_found() {
        let renderer = TemplateRenderer::new();
        let result = renderer.render_verification(&message(SubjectKind::User));
        assert!(matches!(
            result,
            Err(NotificationError::TemplateNotFound(_))
        ));
    }

    #[test]
    fn test_render_with_numbers() {
        let mut renderer = TemplateRenderer::new();
        renderer.register(Template {
            id: "digest".to_string(),
            subject: "{{count}} pending".to_string(),
            body: "You have {{count}} codes".to_string(),
            html_body: None,
        });

        let mut data = HashMap::new();
        data.insert("count".to_string(), serde_json::json!(5));

        let result = renderer.render("digest", &data).unwrap();
        assert_eq!(result.subject, "5 pending");
        assert_eq!(result.body, "You have 5 codes");
        assert!(result.html_body.is_none());
    }
}
