pub mod templates;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::llm::media::ImageData;
pub use templates::{
    ASPECT_RATIO_PRESETS, DEFAULT_ASPECT_RATIO, DEFAULT_DEPTH_OF_FIELD, DEFAULT_MOVIE_NAME,
    DEPTH_OF_FIELD_PRESETS, DOF_TOKEN, MOVIE_NAME_TOKEN, RATIO_TOKEN, SET_PHOTO_TEMPLATE,
};

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[INSERT [A-Z ]+ HERE\]").expect("placeholder regex"));

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Prompt template must not be empty")]
    Empty,
}

/// Prompt text containing zero or more `[INSERT ... HERE]` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate(String);

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Result<Self, TemplateError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(TemplateError::Empty);
        }
        Ok(Self(text))
    }

    /// The built-in behind-the-scenes set photo template.
    pub fn set_photo() -> Self {
        Self(SET_PHOTO_TEMPLATE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::set_photo()
    }
}

/// User-chosen scene settings. Blank strings count as absent.
#[derive(Debug, Clone)]
pub struct SceneParameters {
    pub movie_name: Option<String>,
    pub aspect_ratio: Option<String>,
    pub depth_of_field: Option<String>,
    pub reference_image: Option<ImageData>,
    pub quantity: u32,
    pub custom_prompt: Option<String>,
}

impl Default for SceneParameters {
    fn default() -> Self {
        Self {
            movie_name: None,
            aspect_ratio: None,
            depth_of_field: None,
            reference_image: None,
            quantity: 1,
            custom_prompt: None,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

impl SceneParameters {
    pub fn movie_name_or_default(&self) -> &str {
        non_blank(self.movie_name.as_deref())
            .map(str::trim)
            .unwrap_or(DEFAULT_MOVIE_NAME)
    }

    pub fn aspect_ratio_or_default(&self) -> &str {
        non_blank(self.aspect_ratio.as_deref())
            .map(str::trim)
            .unwrap_or(DEFAULT_ASPECT_RATIO)
    }

    pub fn depth_of_field_or_default(&self) -> &str {
        non_blank(self.depth_of_field.as_deref())
            .map(str::trim)
            .unwrap_or(DEFAULT_DEPTH_OF_FIELD)
    }

    pub fn custom_prompt(&self) -> Option<&str> {
        non_blank(self.custom_prompt.as_deref())
    }

    /// Quantity clamped into `1..=max`.
    pub fn effective_quantity(&self, max: u32) -> u32 {
        self.quantity.clamp(1, max.max(1))
    }
}

/// Fills every placeholder in `template`, ignoring any custom prompt.
pub fn render(template: &PromptTemplate, params: &SceneParameters) -> String {
    template
        .as_str()
        .replace(MOVIE_NAME_TOKEN, params.movie_name_or_default())
        .replace(RATIO_TOKEN, params.aspect_ratio_or_default())
        .replace(DOF_TOKEN, params.depth_of_field_or_default())
}

/// Final prompt for a generation request. A non-blank custom prompt wins
/// verbatim; otherwise the template is rendered.
pub fn build(template: &PromptTemplate, params: &SceneParameters) -> String {
    match params.custom_prompt() {
        Some(custom) => custom.to_string(),
        None => render(template, params),
    }
}

/// Placeholder markers still present in `text`, in order of appearance.
pub fn unresolved_tokens(text: &str) -> Vec<&str> {
    PLACEHOLDER_RE.find_iter(text).map(|m| m.as_str()).collect()
}

pub fn poster_prompt(movie_name: &str) -> String {
    let movie_name = non_blank(Some(movie_name)).unwrap_or(DEFAULT_MOVIE_NAME);
    templates::POSTER_PROMPT.replace("{movie_name}", movie_name.trim())
}

pub fn edit_prompt(instruction: &str) -> String {
    templates::EDIT_PROMPT.replace("{instruction}", instruction.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = "Movie: [INSERT MOVIE NAME HERE], Ratio: [INSERT RATIO HERE]";

    fn scenario_template() -> PromptTemplate {
        PromptTemplate::new(SCENARIO).unwrap()
    }

    #[test]
    fn substitutes_supplied_values() {
        let params = SceneParameters {
            movie_name: Some("Inception".to_string()),
            aspect_ratio: Some("16:9".to_string()),
            ..Default::default()
        };
        assert_eq!(
            build(&scenario_template(), &params),
            "Movie: Inception, Ratio: 16:9"
        );
    }

    #[test]
    fn missing_movie_name_uses_default_title() {
        let params = SceneParameters {
            aspect_ratio: Some("16:9".to_string()),
            ..Default::default()
        };
        let prompt = build(&scenario_template(), &params);
        assert_eq!(prompt, format!("Movie: {DEFAULT_MOVIE_NAME}, Ratio: 16:9"));
    }

    #[test]
    fn supplied_values_are_trimmed() {
        let params = SceneParameters {
            movie_name: Some(" Inception ".to_string()),
            aspect_ratio: Some(" 16:9\n".to_string()),
            ..Default::default()
        };
        assert_eq!(
            build(&scenario_template(), &params),
            "Movie: Inception, Ratio: 16:9"
        );
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let params = SceneParameters {
            movie_name: Some("   ".to_string()),
            aspect_ratio: Some(String::new()),
            depth_of_field: Some(" ".to_string()),
            ..Default::default()
        };
        let template = PromptTemplate::new("[INSERT RATIO HERE] [INSERT DOF HERE]").unwrap();
        assert_eq!(
            build(&template, &params),
            format!("{DEFAULT_ASPECT_RATIO} {DEFAULT_DEPTH_OF_FIELD}")
        );
    }

    #[test]
    fn replaces_every_occurrence_in_builtin_template() {
        let template = PromptTemplate::set_photo();
        assert_eq!(template.as_str().matches(MOVIE_NAME_TOKEN).count(), 2);

        let params = SceneParameters {
            movie_name: Some("花样年华".to_string()),
            aspect_ratio: Some("9:16".to_string()),
            depth_of_field: Some("f/1.2".to_string()),
            ..Default::default()
        };
        let prompt = build(&template, &params);
        assert!(unresolved_tokens(&prompt).is_empty());
        assert_eq!(prompt.matches("花样年华主演").count(), 2);
        assert!(prompt.contains("专业人像摄影机模式拍摄 f/1.2"));
        assert!(prompt.contains("构图： 9:16"));
    }

    #[test]
    fn defaults_leave_no_tokens_behind() {
        let prompt = build(&PromptTemplate::set_photo(), &SceneParameters::default());
        assert!(unresolved_tokens(&prompt).is_empty());
        assert!(prompt.contains(DEFAULT_MOVIE_NAME));
    }

    #[test]
    fn custom_prompt_is_returned_verbatim() {
        let custom = "My own prompt with [INSERT MOVIE NAME HERE] kept";
        let params = SceneParameters {
            movie_name: Some("Inception".to_string()),
            custom_prompt: Some(custom.to_string()),
            ..Default::default()
        };
        assert_eq!(build(&scenario_template(), &params), custom);
        assert_eq!(build(&PromptTemplate::set_photo(), &params), custom);
        // render ignores the override
        assert_eq!(
            render(&scenario_template(), &params),
            "Movie: Inception, Ratio: 16:9"
        );
    }

    #[test]
    fn build_is_deterministic() {
        let params = SceneParameters {
            movie_name: Some("Heat".to_string()),
            ..Default::default()
        };
        let template = PromptTemplate::set_photo();
        assert_eq!(build(&template, &params), build(&template, &params));
    }

    #[test]
    fn finds_unresolved_tokens_in_order() {
        assert_eq!(
            unresolved_tokens(SCENARIO),
            vec![MOVIE_NAME_TOKEN, RATIO_TOKEN]
        );
        assert!(unresolved_tokens("nothing here [insert me]").is_empty());
    }

    #[test]
    fn rejects_empty_template() {
        assert_eq!(PromptTemplate::new("  \n"), Err(TemplateError::Empty));
    }

    #[test]
    fn quantity_is_clamped() {
        let mut params = SceneParameters {
            quantity: 0,
            ..Default::default()
        };
        assert_eq!(params.effective_quantity(4), 1);
        params.quantity = 9;
        assert_eq!(params.effective_quantity(4), 4);
        params.quantity = 3;
        assert_eq!(params.effective_quantity(4), 3);
    }

    #[test]
    fn poster_and_edit_prompts_interpolate() {
        assert!(poster_prompt("Alien").contains("\"Alien\""));
        assert!(poster_prompt("").contains(DEFAULT_MOVIE_NAME));
        assert_eq!(
            edit_prompt(" add rain "),
            "Apply this edit to the image: add rain. Maintain the cinematic, vintage aesthetic."
        );
    }
}
