//! HTML rendering. Everything here is a pure function of the current state.

use std::fmt::Write as _;

use crate::codec::accept_attribute;
use crate::gemini::AnalysisOutcome;
use crate::state::{AnalysisStateMachine, ApplicationState};

/// Seconds between refreshes while a call is in flight.
const REFRESH_SECONDS: u32 = 2;

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn loader() -> String {
    r#"<div class="loading">
            <div class="spinner"></div>
            <p>Analyzing image...</p>
        </div>"#
        .to_string()
}

pub fn error_banner(message: &str) -> String {
    format!(r#"<div class="error" role="alert">{}</div>"#, escape(message))
}

pub fn idle_prompt() -> String {
    r#"<div class="idle">
            <p>Upload an image and click "Analyze Image" to see the magic happen.</p>
        </div>"#
        .to_string()
}

/// Description plus the web references that have a uri.
pub fn result_panel(outcome: &AnalysisOutcome) -> String {
    let mut html = format!(
        r#"<div class="result">
            <div class="result-label">Description</div>
            <div class="result-text">{}</div>
            <div class="meta-info">
                <span>Model: <span class="badge">{}</span></span>
                <span>Processing: <strong>{}</strong>ms</span>
            </div>
        </div>"#,
        escape(&outcome.description),
        escape(&outcome.model),
        outcome.processing_time.as_millis(),
    );

    let links: Vec<_> = outcome
        .web_matches
        .iter()
        .filter(|r| !r.uri.trim().is_empty())
        .collect();

    if !links.is_empty() {
        html.push_str(
            r#"
        <div class="result">
            <div class="result-label">Similar Images on the Web</div>
            <ul class="links">"#,
        );
        for link in links {
            let _ = write!(
                html,
                r#"
                <li><a href="{uri}" target="_blank" rel="noopener noreferrer">
                    <span class="link-title" title="{hover}">{label}</span>
                    <span class="link-uri" title="{uri}">{uri}</span>
                </a></li>"#,
                uri = escape(&link.uri),
                hover = escape(link.hover_title()),
                label = escape(link.label()),
            );
        }
        html.push_str(
            r#"
            </ul>
        </div>"#,
        );
    }

    html
}

/// Picks the view for the right-hand panel.
pub fn status_panel(state: &ApplicationState) -> String {
    match state {
        ApplicationState::Analyzing(_) => loader(),
        ApplicationState::Failed(_, message) => error_banner(message),
        ApplicationState::Succeeded(_, outcome) => result_panel(outcome),
        ApplicationState::Empty | ApplicationState::Ready(_) => idle_prompt(),
    }
}

fn upload_panel(machine: &AnalysisStateMachine) -> String {
    let picker = match machine.state().image() {
        Some(image) => format!(
            r#"<div class="preview-container">
                <img class="preview-image" src="{}" alt="Preview">
                <form method="post" action="/clear">
                    <button type="submit" class="clear-button" aria-label="Clear image">&times;</button>
                </form>
            </div>"#,
            escape(&image.preview.url()),
        ),
        None => String::new(),
    };

    let button_label = if machine.is_analyzing() {
        "Analyzing..."
    } else {
        "Analyze Image"
    };
    let disabled = if machine.can_analyze() { "" } else { " disabled" };

    format!(
        r#"{picker}
            <form class="upload-area" method="post" action="/image" enctype="multipart/form-data">
                <div class="upload-text">Upload an Image</div>
                <div class="upload-hint">PNG, JPG, or WEBP</div>
                <input type="file" name="image" accept="{accept}" onchange="this.form.submit()">
                <noscript><button type="submit">Upload</button></noscript>
            </form>
            <form method="post" action="/analyze">
                <button type="submit" class="analyze-button"{disabled}>{button_label}</button>
            </form>"#,
        accept = accept_attribute(),
    )
}

pub fn render_page(machine: &AnalysisStateMachine) -> String {
    let refresh = if machine.is_analyzing() {
        format!(r#"<meta http-equiv="refresh" content="{REFRESH_SECONDS}">"#)
    } else {
        String::new()
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    {refresh}
    <title>Image Analyzer &amp; Finder</title>
    <style>{STYLE}</style>
</head>
<body>
    <div class="container">
        <h1>Image Analyzer &amp; Finder</h1>
        <p class="subtitle">Let Gemini describe your image and find similar ones across the web.</p>
        <div class="columns">
            <div class="column">
            {upload}
            </div>
            <div class="column panel">
            {status}
            </div>
        </div>
    </div>
</body>
</html>
"#,
        upload = upload_panel(machine),
        status = status_panel(machine.state()),
    )
}

const STYLE: &str = r#"
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, Cantarell, sans-serif;
            background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
            min-height: 100vh;
            padding: 20px;
        }
        .container {
            background: white;
            border-radius: 20px;
            box-shadow: 0 20px 60px rgba(0,0,0,0.3);
            max-width: 1100px;
            margin: 0 auto;
            padding: 40px;
        }
        h1 { color: #333; margin-bottom: 10px; font-size: 2em; }
        .subtitle { color: #666; margin-bottom: 30px; font-size: 0.9em; }
        .columns { display: grid; grid-template-columns: 1fr 1fr; gap: 30px; }
        @media (max-width: 800px) { .columns { grid-template-columns: 1fr; } }
        .column > * + * { margin-top: 16px; }
        .panel {
            border: 1px solid #e0e0e0;
            border-radius: 15px;
            padding: 20px;
            min-height: 300px;
        }
        .upload-area {
            border: 3px dashed #667eea;
            border-radius: 15px;
            padding: 40px 20px;
            text-align: center;
            background: #f8f9ff;
        }
        .upload-text { color: #667eea; font-size: 1.2em; font-weight: 600; margin-bottom: 10px; }
        .upload-hint { color: #999; font-size: 0.9em; margin-bottom: 10px; }
        .preview-container { position: relative; }
        .preview-image {
            width: 100%;
            border-radius: 10px;
            box-shadow: 0 4px 15px rgba(0,0,0,0.1);
        }
        .clear-button {
            position: absolute;
            top: 8px;
            right: 8px;
            background: #c33;
            color: white;
            border: none;
            border-radius: 50%;
            width: 32px;
            height: 32px;
            font-size: 1.2em;
            cursor: pointer;
        }
        .analyze-button {
            width: 100%;
            padding: 12px 24px;
            background: #667eea;
            color: white;
            font-weight: 600;
            border: none;
            border-radius: 10px;
            cursor: pointer;
        }
        .analyze-button:disabled { background: #ccc; color: #777; cursor: not-allowed; }
        .result { background: #f8f9ff; border-radius: 10px; padding: 20px; margin-bottom: 20px; }
        .result-label {
            color: #667eea;
            font-weight: 600;
            margin-bottom: 10px;
            font-size: 0.9em;
            text-transform: uppercase;
            letter-spacing: 1px;
        }
        .result-text { color: #333; font-size: 1.1em; line-height: 1.6; white-space: pre-wrap; }
        .meta-info {
            display: flex;
            justify-content: space-between;
            margin-top: 15px;
            padding-top: 15px;
            border-top: 1px solid #e0e0e0;
            font-size: 0.85em;
            color: #666;
        }
        .badge {
            display: inline-block;
            background: #667eea;
            color: white;
            padding: 4px 12px;
            border-radius: 20px;
            font-size: 0.8em;
            font-weight: 600;
        }
        .links { list-style: none; max-height: 24em; overflow-y: auto; }
        .links li { padding: 10px 0; border-bottom: 1px solid #e0e0e0; }
        .links a { text-decoration: none; display: block; }
        .link-title { display: block; color: #667eea; font-weight: 600; }
        .link-uri { display: block; color: #999; font-size: 0.85em; overflow: hidden; text-overflow: ellipsis; white-space: nowrap; }
        .loading { text-align: center; padding: 40px; }
        .spinner {
            border: 4px solid #f3f3f3;
            border-top: 4px solid #667eea;
            border-radius: 50%;
            width: 50px;
            height: 50px;
            animation: spin 1s linear infinite;
            margin: 0 auto 20px;
        }
        @keyframes spin { 0% { transform: rotate(0deg); } 100% { transform: rotate(360deg); } }
        .idle { text-align: center; color: #666; padding: 40px; }
        .error {
            background: #fee;
            border: 2px solid #fcc;
            color: #c33;
            padding: 15px;
            border-radius: 10px;
        }
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode, PreviewStore};
    use crate::gemini::WebReference;
    use axum::body::Bytes;
    use std::time::Duration;

    fn outcome(matches: Vec<WebReference>) -> AnalysisOutcome {
        AnalysisOutcome {
            description: "A red bicycle.".to_string(),
            web_matches: matches,
            model: "gemini-2.5-flash".to_string(),
            processing_time: Duration::from_millis(42),
        }
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn result_panel_shows_description_and_link() {
        let html = result_panel(&outcome(vec![WebReference {
            uri: "https://example.com/bike".to_string(),
            title: Some("Bike Shop".to_string()),
        }]));
        assert!(html.contains("A red bicycle."));
        assert!(html.contains(r#"href="https://example.com/bike""#));
        assert!(html.contains(r#"title="Bike Shop">Bike Shop</span>"#));
        assert!(html.contains("42</strong>ms"));
    }

    #[test]
    fn untitled_link_falls_back() {
        let html = result_panel(&outcome(vec![WebReference {
            uri: "https://example.com/x".to_string(),
            title: None,
        }]));
        assert!(html.contains(r#"title="https://example.com/x">Untitled Link</span>"#));
    }

    #[test]
    fn blank_uris_are_hidden() {
        let html = result_panel(&outcome(vec![WebReference {
            uri: "  ".to_string(),
            title: Some("Ghost".to_string()),
        }]));
        assert!(!html.contains("Ghost"));
        assert!(!html.contains("Similar Images on the Web"));
    }

    #[test]
    fn panel_follows_state() {
        let store = PreviewStore::new();
        let mut machine = AnalysisStateMachine::new();
        assert!(status_panel(machine.state()).contains("magic happen"));

        let _ = machine.begin_analysis();
        assert!(status_panel(machine.state()).contains("Please upload an image first."));

        machine.select_image(encode(Bytes::from_static(b"img"), Some("image/png"), &store));
        assert!(status_panel(machine.state()).contains("magic happen"));

        let _ = machine.begin_analysis();
        assert!(status_panel(machine.state()).contains("Analyzing image..."));
    }

    #[test]
    fn page_disables_button_without_image() {
        let machine = AnalysisStateMachine::new();
        let html = render_page(&machine);
        assert!(html.contains(r#"class="analyze-button" disabled>Analyze Image"#));
        assert!(html.contains(r#"accept="image/png, image/jpeg, image/webp""#));
        assert!(!html.contains("http-equiv=\"refresh\""));
    }

    #[test]
    fn page_refreshes_while_analyzing() {
        let store = PreviewStore::new();
        let mut machine = AnalysisStateMachine::new();
        machine.select_image(encode(Bytes::from_static(b"img"), Some("image/png"), &store));
        let html = render_page(&machine);
        assert!(html.contains(r#"class="analyze-button">Analyze Image"#));
        assert!(html.contains("/preview/"));

        let _ = machine.begin_analysis();
        let html = render_page(&machine);
        assert!(html.contains("http-equiv=\"refresh\""));
        assert!(html.contains(r#"disabled>Analyzing..."#));
    }
}
