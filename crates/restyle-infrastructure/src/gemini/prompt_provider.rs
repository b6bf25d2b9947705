//! Gemini-backed analysis + prompt generation.
//!
//! One combined `generateContent` call returns both the structured subject
//! analysis and the list of editing instructions. The response is parsed as
//! JSON first; when the model wraps or mangles the JSON, a line-based
//! fallback recovers whatever numbered prompts are present and substitutes
//! an all-"unknown" analysis rather than failing the session.

use super::client::{GeminiClient, Part, TEXT_MODEL};
use crate::retry::{RetryPolicy, with_retries};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use restyle_core::error::{RestyleError, Result};
use restyle_core::provider::{ImageSource, PromptPlan, PromptProvider};
use restyle_core::session::{ImageAnalysis, VariationKind};
use serde::Deserialize;

pub struct GeminiPromptProvider {
    client: GeminiClient,
    retry: RetryPolicy,
}

impl GeminiPromptProvider {
    pub fn new(client: GeminiClient) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl PromptProvider for GeminiPromptProvider {
    async fn analyze_and_generate_prompts(
        &self,
        image: &ImageSource,
        kind: VariationKind,
        count: usize,
    ) -> Result<PromptPlan> {
        let encoded = self.client.encode_image(image).await?;
        let instruction = build_instruction(kind, count);

        let response = with_retries(&self.retry, "analyze_and_generate_prompts", |attempt| {
            let parts = vec![
                Part::inline_image(&encoded),
                Part::text(instruction.as_str()),
            ];
            async move {
                tracing::debug!(
                    "[GeminiPromptProvider] Requesting analysis + {} prompts (attempt {})",
                    count,
                    attempt
                );
                self.client.generate_content(TEXT_MODEL, parts).await
            }
        })
        .await?;

        let plan = parse_plan(&response.text(), count)?;
        tracing::info!(
            "[GeminiPromptProvider] Generated {} {} prompts",
            plan.prompts.len(),
            kind
        );
        Ok(plan)
    }
}

fn build_instruction(kind: VariationKind, count: usize) -> String {
    let (focus, preserve, diversity) = match kind {
        VariationKind::Hairstyle => (
            "hair",
            "facial features, skin tone, eye color, facial structure, and composition",
            "diverse hairstyles (short, long, curly, straight, braided, updo, etc.)",
        ),
        VariationKind::Outfit => (
            "clothing",
            "facial features, skin tone, hair, facial structure, and composition",
            "diverse outfit styles (casual, formal, bohemian, edgy, professional, etc.)",
        ),
    };
    format!(
        r#"Analyze this portrait photo, then write {count} image editing prompts for it.

First, analyze the person: gender, age range, hair color, hair length, current hair style, face shape, skin tone, eye color, body type, current clothing style, and overall style aesthetic. Be specific; this information is used to generate consistent variations.

Then write {count} unique {focus} editing prompts that:
1. Use the inpainting/semantic masking approach
2. Change ONLY the {focus} while keeping everything else exactly the same
3. Create {diversity}
4. Are appropriate for the person's age and features
5. Include specific styling details and texture descriptions
6. Use professional photography terminology

Phrase each prompt as: "Using the provided image, change only the {focus} to [specific description]. Keep everything else in the image exactly the same, preserving the original {preserve}. The person's identity and appearance should remain completely unchanged except for the {focus}."

Respond with ONLY a JSON object of this exact shape:
{{"analysis": {{"gender": "...", "age_range": "...", "hair_color": "...", "hair_length": "...", "hair_style": "...", "face_shape": "...", "skin_tone": "...", "eye_color": "...", "body_type": "...", "clothing_style": "...", "overall_style": "..."}}, "prompts": ["...", "..."]}}"#
    )
}

/// Analysis as the model reports it; anything missing stays "unknown".
#[derive(Deserialize, Default)]
#[serde(default)]
struct WirePlan {
    analysis: WireAnalysis,
    prompts: Vec<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WireAnalysis {
    gender: Option<String>,
    age_range: Option<String>,
    hair_color: Option<String>,
    hair_length: Option<String>,
    hair_style: Option<String>,
    face_shape: Option<String>,
    skin_tone: Option<String>,
    eye_color: Option<String>,
    body_type: Option<String>,
    clothing_style: Option<String>,
    overall_style: Option<String>,
}

impl From<WireAnalysis> for ImageAnalysis {
    fn from(wire: WireAnalysis) -> Self {
        let field = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "unknown".to_string())
        };
        Self {
            gender: field(wire.gender),
            age_range: field(wire.age_range),
            hair_color: field(wire.hair_color),
            hair_length: field(wire.hair_length),
            hair_style: field(wire.hair_style),
            face_shape: field(wire.face_shape),
            skin_tone: field(wire.skin_tone),
            eye_color: field(wire.eye_color),
            body_type: field(wire.body_type),
            clothing_style: field(wire.clothing_style),
            overall_style: field(wire.overall_style),
        }
    }
}

/// Parses the model's answer into a plan, tolerating surrounding prose and
/// falling back to numbered-line extraction when the JSON is unusable.
///
/// Prompts are truncated to `count` but never padded; at least one prompt
/// must be recoverable.
pub(crate) fn parse_plan(text: &str, count: usize) -> Result<PromptPlan> {
    if let Some(json) = slice_json_object(text) {
        if let Ok(wire) = serde_json::from_str::<WirePlan>(json) {
            let mut prompts: Vec<String> = wire
                .prompts
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            if !prompts.is_empty() {
                prompts.truncate(count);
                return Ok(PromptPlan {
                    analysis: wire.analysis.into(),
                    prompts,
                });
            }
        }
    }

    tracing::warn!(
        "[GeminiPromptProvider] Response was not well-formed JSON, falling back to line parse"
    );
    let mut prompts = extract_numbered_lines(text);
    if prompts.is_empty() {
        return Err(RestyleError::provider_fatal(
            "no prompts could be recovered from the provider response",
        ));
    }
    prompts.truncate(count);
    Ok(PromptPlan {
        analysis: ImageAnalysis::default(),
        prompts,
    })
}

/// The substring from the first `{` to the last `}`, tolerating prose and
/// code fences around the JSON object.
fn slice_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

static NUMBERED_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d+[.)]\s*(.+)$").expect("valid regex"));

fn extract_numbered_lines(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            NUMBERED_LINE
                .captures(line)
                .map(|caps| caps[1].trim().to_string())
        })
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_json_with_surrounding_prose_parses() {
        let text = r#"Sure! Here is the JSON you asked for:
{"analysis": {"gender": "female", "hair_color": "brown"},
 "prompts": ["Using the provided image, change only the hair to a bob.",
             "Using the provided image, change only the hair to long waves."]}
Hope that helps!"#;

        let plan = parse_plan(text, 10).unwrap();
        assert_eq!(plan.prompts.len(), 2);
        assert_eq!(plan.analysis.gender, "female");
        assert_eq!(plan.analysis.hair_color, "brown");
        // Missing fields degrade to "unknown", not empty strings.
        assert_eq!(plan.analysis.eye_color, "unknown");
    }

    #[test]
    fn prompt_list_is_truncated_but_never_padded() {
        let prompts: Vec<String> = (0..12).map(|i| format!("\"edit {i}\"")).collect();
        let text = format!(
            r#"{{"analysis": {{}}, "prompts": [{}]}}"#,
            prompts.join(",")
        );

        let plan = parse_plan(&text, 10).unwrap();
        assert_eq!(plan.prompts.len(), 10);

        let short = r#"{"analysis": {}, "prompts": ["a", "b", "c", "d", "e", "f", "g"]}"#;
        let plan = parse_plan(short, 10).unwrap();
        assert_eq!(plan.prompts.len(), 7);
    }

    #[test]
    fn malformed_json_falls_back_to_numbered_lines() {
        let text = "I could not produce JSON, but here are prompts:\n\
                    1. Change only the hair to a pixie cut.\n\
                    2) Change only the hair to waist-length braids.\n\
                    some unnumbered commentary\n\
                    3. Change only the hair to silver curls.";

        let plan = parse_plan(text, 10).unwrap();
        assert_eq!(plan.prompts.len(), 3);
        assert_eq!(plan.prompts[0], "Change only the hair to a pixie cut.");
        assert_eq!(plan.prompts[1], "Change only the hair to waist-length braids.");
        assert_eq!(plan.analysis, ImageAnalysis::default());
    }

    #[test]
    fn unrecoverable_response_is_a_fatal_provider_error() {
        let err = parse_plan("I am sorry, I cannot help with that.", 10).unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn json_with_empty_prompt_list_falls_back_before_failing() {
        let text = "{\"analysis\": {}, \"prompts\": []}\n1. A usable numbered prompt.";
        let plan = parse_plan(text, 10).unwrap();
        assert_eq!(plan.prompts.len(), 1);
    }

    #[test]
    fn instruction_mentions_kind_and_count() {
        let hair = build_instruction(VariationKind::Hairstyle, 10);
        assert!(hair.contains("10"));
        assert!(hair.contains("change only the hair"));
        let outfit = build_instruction(VariationKind::Outfit, 5);
        assert!(outfit.contains("change only the clothing"));
    }
}
