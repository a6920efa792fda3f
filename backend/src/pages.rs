//! Server-rendered HTML pages.
//!
//! Templates live in `backend/templates` and are embedded at compile time.
//! Placeholders use `{{TOKEN}}`; every substituted value goes through
//! [`escape`] first, and unfilled placeholders are blanked before the page
//! leaves the server.

use birads_shared::{BiradsClass, ClassificationResponse, FeedbackRecordView};
use strum::IntoEnumIterator;

const LAYOUT: &str = include_str!("../templates/layout.html");
const SIGN_IN: &str = include_str!("../templates/sign_in.html");
const SIGN_UP: &str = include_str!("../templates/sign_up.html");
const DASHBOARD: &str = include_str!("../templates/dashboard.html");
const CLASSIFY: &str = include_str!("../templates/classify.html");
const RESULT: &str = include_str!("../templates/result.html");
const ERROR: &str = include_str!("../templates/error.html");

const NAV_SIGNED_OUT: &str = r#"<a href="/">Sign in</a><a href="/sign-up">Sign up</a>"#;
const NAV_SIGNED_IN: &str =
    r#"<a href="/dashboard">Dashboard</a><a href="/classify">Classify</a><a href="/logout">Log out</a>"#;

pub fn sign_in(error: Option<&str>) -> String {
    let body = SIGN_IN.replace("{{ERROR}}", &error_banner(error));
    layout("Sign in", NAV_SIGNED_OUT, &body)
}

pub fn sign_up(error: Option<&str>) -> String {
    let body = SIGN_UP.replace("{{ERROR}}", &error_banner(error));
    layout("Sign up", NAV_SIGNED_OUT, &body)
}

pub fn dashboard(username: &str, recent: &[FeedbackRecordView]) -> String {
    let feedback = if recent.is_empty() {
        "<p>No feedback recorded yet.</p>".to_string()
    } else {
        let rows: String = recent
            .iter()
            .map(|record| {
                format!(
                    "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                    escape(&record.file_path),
                    escape(&record.prediction),
                    record.feedback,
                    escape(record.correct_class.as_deref().unwrap_or("-")),
                )
            })
            .collect();
        format!(
            "<table>\n<tr><th>Image</th><th>Prediction</th><th>Feedback</th><th>Correct class</th></tr>\n{}</table>",
            rows
        )
    };
    let body = DASHBOARD
        .replace("{{USERNAME}}", &escape(username))
        .replace("{{RECENT_FEEDBACK}}", &feedback);
    layout("Dashboard", NAV_SIGNED_IN, &body)
}

pub fn classify(result: Option<&ClassificationResponse>, error: Option<&str>) -> String {
    let result_html = result.map(render_result).unwrap_or_default();
    let body = CLASSIFY
        .replace("{{ERROR}}", &error_banner(error))
        .replace("{{RESULT}}", &result_html);
    layout("Classify", NAV_SIGNED_IN, &body)
}

pub fn error(message: &str) -> String {
    let body = ERROR.replace("{{MESSAGE}}", &escape(message));
    layout("Error", NAV_SIGNED_IN, &body)
}

fn render_result(result: &ClassificationResponse) -> String {
    let rows: String = result
        .probabilities
        .iter()
        .map(|p| {
            format!(
                "    <tr><td>{}</td><td>{:.1}%</td></tr>\n",
                escape(&p.label),
                p.probability * 100.0
            )
        })
        .collect();
    let options: String = BiradsClass::iter()
        .map(|class| format!("      <option value=\"{0}\">{0}</option>\n", class))
        .collect();
    RESULT
        .replace("{{PREDICTION}}", &escape(&result.prediction.to_string()))
        .replace(
            "{{CONFIDENCE}}",
            &format!("{:.1}%", result.confidence * 100.0),
        )
        .replace("{{IMAGE_PATH}}", &escape(&result.image_path))
        .replace("{{PROBABILITY_ROWS}}", &rows)
        .replace("{{CLASS_OPTIONS}}", &options)
}

fn layout(title: &str, nav: &str, body: &str) -> String {
    let html = LAYOUT
        .replace("{{TITLE}}", &escape(title))
        .replace("{{NAV}}", nav)
        .replace("{{BODY}}", body);
    blank_remaining(html)
}

fn error_banner(error: Option<&str>) -> String {
    match error {
        Some(message) => format!("<p class=\"error\">{}</p>", escape(message)),
        None => String::new(),
    }
}

/// HTML-escapes text, including braces so user input cannot form placeholders.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '{' => out.push_str("&#123;"),
            '}' => out.push_str("&#125;"),
            _ => out.push(c),
        }
    }
    out
}

fn blank_remaining(mut html: String) -> String {
    while let Some(start) = html.find("{{") {
        match html[start..].find("}}") {
            Some(end) => html.replace_range(start..start + end + 2, ""),
            None => break,
        }
    }
    html
}
