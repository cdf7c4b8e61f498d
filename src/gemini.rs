//! Client for the Gemini `generateContent` endpoint with Google Search grounding.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::AnalysisError;

pub const ANALYSIS_PROMPT: &str =
    "Describe this image in detail. Then, find websites that contain similar images.";

const UNTITLED_LINK: &str = "Untitled Link";

/// A web page the model cited while answering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebReference {
    pub uri: String,
    pub title: Option<String>,
}

impl WebReference {
    /// Link text.
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(UNTITLED_LINK)
    }

    /// Hover text; the uri when there is no title.
    pub fn hover_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.uri)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisOutcome {
    pub description: String,
    pub web_matches: Vec<WebReference>,
    pub model: String,
    pub processing_time: Duration,
}

// Wire format

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    tools: Vec<Tool>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum RequestPart<'a> {
    InlineData(InlineData<'a>),
    Text(&'a str),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Serialize)]
struct GoogleSearch {}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Deserialize)]
struct WebSource {
    uri: Option<String>,
    title: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    /// Grounding chunks with a usable uri, in reply order.
    fn web_references(&self) -> Vec<WebReference> {
        self.candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|meta| {
                meta.grounding_chunks
                    .iter()
                    .filter_map(|chunk| chunk.web.as_ref())
                    .filter_map(|web| {
                        let uri = web.uri.as_deref()?.trim();
                        if uri.is_empty() {
                            return None;
                        }
                        Some(WebReference {
                            uri: uri.to_string(),
                            title: web
                                .title
                                .as_deref()
                                .map(str::trim)
                                .filter(|t| !t.is_empty())
                                .map(str::to_string),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(500).collect()
}

/// Sends one image per call to Gemini. No retries, no caching.
#[derive(Clone)]
pub struct AnalysisClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl AnalysisClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            endpoint: format!(
                "{}/v1beta/models/{}:generateContent",
                config.api_base, config.model
            ),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn analyze(
        &self,
        payload: &str,
        media_type: &str,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let start = Instant::now();
        self.generate(payload, media_type)
            .await
            .map(|(description, web_matches)| AnalysisOutcome {
                description,
                web_matches,
                model: self.model.clone(),
                processing_time: start.elapsed(),
            })
            .map_err(|detail| {
                tracing::error!(error = %detail, "error analyzing image with Gemini API");
                AnalysisError::from_cause(detail)
            })
    }

    async fn generate(
        &self,
        payload: &str,
        media_type: &str,
    ) -> Result<(String, Vec<WebReference>), String> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    RequestPart::InlineData(InlineData {
                        mime_type: media_type,
                        data: payload,
                    }),
                    RequestPart::Text(ANALYSIS_PROMPT),
                ],
            }],
            tools: vec![Tool {
                google_search: GoogleSearch {},
            }],
        };

        tracing::info!(model = %self.model, media_type, "sending request to Gemini");

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        let body = response.text().await.map_err(|e| e.to_string())?;

        tracing::debug!(%status, body = %snippet(&body), "Gemini response");

        if !status.is_success() {
            let body = body.trim();
            return Err(if body.is_empty() {
                status.to_string()
            } else {
                format!("{status}: {body}")
            });
        }

        let reply: GenerateContentResponse =
            serde_json::from_str(&body).map_err(|e| format!("invalid response: {e}"))?;

        let description = reply.text();
        if description.trim().is_empty() {
            return Err("Failed to generate a description for the image.".to_string());
        }

        let references = reply.web_references();
        tracing::info!(references = references.len(), "analysis complete");
        Ok((description, references))
    }
}
