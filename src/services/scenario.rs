//! Scenario catalog: background/lighting profiles used to steer generation
//! prompts, matched against product tags.
//!
//! Pure reference data plus two lookups: the deterministic tag match used
//! for fresh generations and the uniform in-category pick used for remixes.

use rand::seq::SliceRandom;

use crate::models::scenario::ScenarioProfile;

/// Category used when no rule matches the product tags.
pub const DEFAULT_CATEGORY: &str = "studio";

// Keyword containment rules, tried top to bottom; the first category with a
// matching keyword wins. Keywords are matched against the lowercased
// concatenation of all product tags.
const CATEGORY_RULES: &[(&str, &[&str])] = &[
    (
        "urban",
        &[
            "jeans", "denim", "streetwear", "moletom", "hoodie", "jaqueta",
            "sneaker", "tenis", "cargo", "oversized",
        ],
    ),
    (
        "nature",
        &[
            "esporte", "sport", "legging", "fitness", "trilha", "outdoor",
            "praia", "biquini", "bikini", "linho",
        ],
    ),
    (
        "luxury-interior",
        &[
            "festa", "gala", "vestido longo", "noiva", "terno", "smoking",
            "tuxedo", "luxo", "alfaiataria", "seda",
        ],
    ),
];

/// All scenario profiles, grouped by category.
pub const SCENARIO_CATALOG: &[ScenarioProfile] = &[
    // Studio (default)
    ScenarioProfile {
        category: "studio",
        name: "studio-softbox",
        lighting_prompt: "clean seamless studio backdrop, large softbox key light, gentle fill, neutral grey tones",
    },
    ScenarioProfile {
        category: "studio",
        name: "studio-highkey",
        lighting_prompt: "bright high-key white studio, even shadowless lighting, subtle floor reflection",
    },
    ScenarioProfile {
        category: "studio",
        name: "studio-editorial",
        lighting_prompt: "dark charcoal studio backdrop, single hard rim light, dramatic editorial contrast",
    },
    // Urban
    ScenarioProfile {
        category: "urban",
        name: "urban-daylight-street",
        lighting_prompt: "sunlit city sidewalk, soft morning light, blurred storefronts in the background",
    },
    ScenarioProfile {
        category: "urban",
        name: "urban-brick-alley",
        lighting_prompt: "textured brick alley, warm late-afternoon sun raking across the wall",
    },
    ScenarioProfile {
        category: "urban",
        name: "urban-neon-night",
        lighting_prompt: "night street scene, colorful neon signage bokeh, cinematic teal and magenta glow",
    },
    ScenarioProfile {
        category: "urban",
        name: "urban-rooftop",
        lighting_prompt: "rooftop terrace at golden hour, city skyline softly out of focus behind",
    },
    // Nature
    ScenarioProfile {
        category: "nature",
        name: "nature-garden",
        lighting_prompt: "lush green garden, dappled sunlight through leaves, airy open shade",
    },
    ScenarioProfile {
        category: "nature",
        name: "nature-beach",
        lighting_prompt: "sandy beach near sunset, warm backlight, gentle ocean haze",
    },
    ScenarioProfile {
        category: "nature",
        name: "nature-field",
        lighting_prompt: "open grass field under a bright overcast sky, soft diffuse light",
    },
    // Luxury interior
    ScenarioProfile {
        category: "luxury-interior",
        name: "luxury-marble-lobby",
        lighting_prompt: "marble hotel lobby, warm chandelier glow, polished floor reflections",
    },
    ScenarioProfile {
        category: "luxury-interior",
        name: "luxury-penthouse",
        lighting_prompt: "penthouse living room at dusk, floor-to-ceiling windows, soft ambient lamps",
    },
    ScenarioProfile {
        category: "luxury-interior",
        name: "luxury-grand-stair",
        lighting_prompt: "grand staircase with velvet runner, warm tungsten accent lighting",
    },
];

/// Deterministically resolve a scenario from product tags.
///
/// Matches the lowercased tag text against the category rules and returns
/// the first profile of the first matching category; falls back to the
/// default category when nothing matches.
pub fn resolve(product_tags: &[String]) -> &'static ScenarioProfile {
    let haystack = product_tags.join(" ").to_lowercase();

    for (category, keywords) in CATEGORY_RULES {
        if keywords.iter().any(|kw| haystack.contains(kw)) {
            return first_in(category);
        }
    }
    first_in(DEFAULT_CATEGORY)
}

/// Pick uniformly at random among all profiles of `category` (remix
/// variation). A single-member category returns that member; an unknown
/// category falls back to the default category.
pub fn resolve_random_within(category: &str) -> &'static ScenarioProfile {
    let members: Vec<&'static ScenarioProfile> = profiles_in(category).collect();
    if members.is_empty() {
        return first_in(DEFAULT_CATEGORY);
    }
    members
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or_else(|| first_in(DEFAULT_CATEGORY))
}

pub fn profiles_in(category: &str) -> impl Iterator<Item = &'static ScenarioProfile> + '_ {
    SCENARIO_CATALOG.iter().filter(move |p| p.category == category)
}

fn first_in(category: &str) -> &'static ScenarioProfile {
    SCENARIO_CATALOG
        .iter()
        .find(|p| p.category == category)
        .unwrap_or(&SCENARIO_CATALOG[0])
}
