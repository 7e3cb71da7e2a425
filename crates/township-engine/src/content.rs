//! The content collaborator: English sprite prompts and image URLs.
//!
//! Generation never runs inside a tick. The executor asks a
//! [`ContentSource`] for a short English prompt describing the new sprite
//! and turns it into an image URL for the rendering service. An empty or
//! missing prompt falls back to a fixed phrase so a discovery always gets
//! a name.

use std::sync::atomic::{AtomicUsize, Ordering};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use township_core::config::GenerationConfig;
use township_core::inputs::DiscoveryKind;

/// Prompt used when a building prompt comes back empty.
pub const FALLBACK_BUILDING_PROMPT: &str = "cozy pixel building";

/// Prompt used when an item prompt comes back empty.
pub const FALLBACK_ITEM_PROMPT: &str = "cozy pixel item";

/// Source of English prompts for generated sprites.
///
/// Implementations may be slow; they are only ever called from the
/// out-of-band executor.
pub trait ContentSource: Send + Sync {
    /// A prompt for a new discovery of `kind`, or `None` if nothing came
    /// back.
    fn english_prompt(&self, kind: DiscoveryKind) -> Option<String>;
}

/// The fixed prompt for `kind`.
pub const fn fallback_prompt(kind: DiscoveryKind) -> &'static str {
    match kind {
        DiscoveryKind::Building => FALLBACK_BUILDING_PROMPT,
        DiscoveryKind::Item => FALLBACK_ITEM_PROMPT,
    }
}

/// Ask `source` for a prompt, trimming it and falling back when it is
/// missing or blank.
pub fn resolve_prompt(source: &dyn ContentSource, kind: DiscoveryKind) -> String {
    source
        .english_prompt(kind)
        .map(|prompt| prompt.trim().to_owned())
        .filter(|prompt| !prompt.is_empty())
        .unwrap_or_else(|| fallback_prompt(kind).to_owned())
}

// ---------------------------------------------------------------------------
// Canned prompts
// ---------------------------------------------------------------------------

const BUILDING_PROMPTS: &[&str] = &[
    "pixel art bakery with a striped awning, top-down RPG style",
    "pixel art stone watchtower on a grassy field, top-down RPG style",
    "pixel art wooden tea house with paper lanterns, top-down RPG style",
    "pixel art greenhouse full of sunflowers, top-down RPG style",
    "pixel art tiny library with a red door, top-down RPG style",
];

const ITEM_PROMPTS: &[&str] = &[
    "pixel art brass lantern on grass",
    "pixel art basket of apples on grass",
    "pixel art old compass on grass",
    "pixel art potted fern on grass",
    "pixel art wooden signpost on grass",
    "pixel art music box on grass",
];

/// A [`ContentSource`] that rotates through a built-in prompt list.
///
/// Used when no language model is wired in.
#[derive(Debug, Default)]
pub struct CannedContent {
    next: AtomicUsize,
}

impl CannedContent {
    /// Create a source starting at the first prompt.
    pub const fn new() -> Self {
        Self {
            next: AtomicUsize::new(0),
        }
    }
}

impl ContentSource for CannedContent {
    fn english_prompt(&self, kind: DiscoveryKind) -> Option<String> {
        let prompts = match kind {
            DiscoveryKind::Building => BUILDING_PROMPTS,
            DiscoveryKind::Item => ITEM_PROMPTS,
        };
        let turn = self.next.fetch_add(1, Ordering::Relaxed);
        turn.checked_rem(prompts.len())
            .and_then(|index| prompts.get(index))
            .map(|prompt| (*prompt).to_owned())
    }
}

// ---------------------------------------------------------------------------
// Image URLs
// ---------------------------------------------------------------------------

/// The rendering-service URL for `prompt`.
///
/// The prompt becomes a single percent-encoded path segment; model, size
/// and `seed` go into the query string.
pub fn image_url(config: &GenerationConfig, prompt: &str, seed: u32) -> String {
    let base = config.image_base_url.trim_end_matches('/');
    let size = config.image_size;
    format!(
        "{base}/{}?model={}&width={size}&height={size}&nologo=true&seed={seed}",
        encode_component(prompt),
        encode_component(&config.image_model),
    )
}

/// Everything but the characters `encodeURIComponent` leaves alone.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, URI_COMPONENT).to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct Silent;

    impl ContentSource for Silent {
        fn english_prompt(&self, _kind: DiscoveryKind) -> Option<String> {
            Some("   ".to_owned())
        }
    }

    #[test]
    fn blank_prompts_fall_back() {
        assert_eq!(resolve_prompt(&Silent, DiscoveryKind::Building), "cozy pixel building");
        assert_eq!(resolve_prompt(&Silent, DiscoveryKind::Item), "cozy pixel item");
    }

    #[test]
    fn canned_content_rotates() {
        let content = CannedContent::new();
        let first = content.english_prompt(DiscoveryKind::Item).unwrap();
        let second = content.english_prompt(DiscoveryKind::Item).unwrap();
        assert_ne!(first, second);
        assert!(resolve_prompt(&content, DiscoveryKind::Building).contains("pixel art"));
    }

    #[test]
    fn prompts_are_encoded_as_one_segment() {
        assert_eq!(encode_component("cozy pixel item"), "cozy%20pixel%20item");
        assert_eq!(encode_component("a/b?c&d"), "a%2Fb%3Fc%26d");
        assert_eq!(encode_component("café"), "caf%C3%A9");
        assert_eq!(encode_component("keep-_.!~*'()"), "keep-_.!~*'()");
    }

    #[test]
    fn image_urls_carry_model_size_and_seed() {
        let mut config = GenerationConfig::default();
        config.image_base_url = "https://images.example/prompt/".to_owned();
        let url = image_url(&config, "cozy pixel building", 7);
        assert_eq!(
            url,
            "https://images.example/prompt/cozy%20pixel%20building?model=flux&width=512&height=512&nologo=true&seed=7"
        );
    }
}
