//! Built-in species catalog.

use super::types::{
    AnatomyMarker, BodyProportions, CatalogEntry, Compression, QualityTier, Template,
    VisualizationMode,
};

/// Organ marker positions for a unit-sized body.
const ORGAN_OFFSETS: [(&str, [f32; 3]); 6] = [
    ("heart", [0.3, 0.0, 0.6]),
    ("lungs", [0.35, 0.0, 0.65]),
    ("stomach", [0.0, 0.0, 0.4]),
    ("liver", [-0.2, 0.15, 0.45]),
    ("kidneys", [-0.3, 0.0, 0.5]),
    ("brain", [0.6, 0.0, 0.8]),
];

const TIER_NAMES: [&str; 4] = ["mobile", "tablet", "desktop", "pro"];

pub(super) fn tiers() -> Vec<QualityTier> {
    vec![
        QualityTier::new("mobile", 600, 256, Compression::High),
        QualityTier::new("tablet", 2_500, 512, Compression::Medium),
        QualityTier::new("desktop", 10_000, 1024, Compression::Low),
        QualityTier::new("pro", 35_000, 2048, Compression::None),
    ]
}

struct Species {
    id: &'static str,
    name: &'static str,
    template: Template,
    scale: f32,
    proportions: (f32, f32, f32),
    colors: &'static [&'static str],
    features: &'static [&'static str],
}

const SPECIES: &[Species] = &[
    Species {
        id: "cat",
        name: "Cat",
        template: Template::QuadrupedSmall,
        scale: 0.6,
        proportions: (1.2, 0.8, 0.6),
        colors: &["orange", "black", "white", "tabby", "grey"],
        features: &["pointed_ears", "long_tail", "retractable_claws"],
    },
    Species {
        id: "rabbit",
        name: "Rabbit",
        template: Template::QuadrupedSmall,
        scale: 0.4,
        proportions: (1.0, 0.9, 0.7),
        colors: &["white", "brown", "grey", "black_white"],
        features: &["long_ears", "cotton_tail", "strong_hind_legs"],
    },
    Species {
        id: "guinea_pig",
        name: "Guinea Pig",
        template: Template::QuadrupedSmall,
        scale: 0.3,
        proportions: (1.4, 0.6, 0.8),
        colors: &["brown_white", "black", "tricolor"],
        features: &["round_body", "small_ears", "short_legs"],
    },
    Species {
        id: "ferret",
        name: "Ferret",
        template: Template::QuadrupedSmall,
        scale: 0.5,
        proportions: (2.0, 0.5, 0.4),
        colors: &["albino", "sable", "silver"],
        features: &["elongated_body", "flexible_spine"],
    },
    Species {
        id: "dog",
        name: "Dog",
        template: Template::QuadrupedMedium,
        scale: 1.0,
        proportions: (1.5, 1.0, 0.7),
        colors: &["brown", "black", "white", "spotted", "golden"],
        features: &["floppy_ears", "wagging_tail"],
    },
    Species {
        id: "sheep",
        name: "Sheep",
        template: Template::QuadrupedMedium,
        scale: 1.2,
        proportions: (1.3, 1.0, 0.9),
        colors: &["white", "black", "brown"],
        features: &["woolly_coat", "curved_horns"],
    },
    Species {
        id: "goat",
        name: "Goat",
        template: Template::QuadrupedMedium,
        scale: 1.0,
        proportions: (1.2, 1.1, 0.6),
        colors: &["white", "brown", "black_white"],
        features: &["beard", "horns", "climbing_hooves"],
    },
    Species {
        id: "pig",
        name: "Pig",
        template: Template::QuadrupedMedium,
        scale: 1.1,
        proportions: (1.4, 0.8, 1.0),
        colors: &["pink", "black", "spotted"],
        features: &["snout", "curly_tail"],
    },
    Species {
        id: "horse",
        name: "Horse",
        template: Template::QuadrupedLarge,
        scale: 2.5,
        proportions: (2.0, 1.8, 0.8),
        colors: &["brown", "black", "white", "chestnut", "grey"],
        features: &["mane", "long_tail", "powerful_legs", "hooves"],
    },
    Species {
        id: "cow",
        name: "Cow",
        template: Template::QuadrupedLarge,
        scale: 2.2,
        proportions: (2.2, 1.6, 1.2),
        colors: &["black_white", "brown", "holstein", "jersey"],
        features: &["udders", "horns", "large_body"],
    },
    Species {
        id: "llama",
        name: "Llama",
        template: Template::QuadrupedLarge,
        scale: 1.8,
        proportions: (1.5, 2.0, 0.8),
        colors: &["white", "brown", "grey", "mixed"],
        features: &["long_neck", "woolly_coat", "split_lip"],
    },
    Species {
        id: "canary",
        name: "Canary",
        template: Template::BirdSmall,
        scale: 0.15,
        proportions: (0.6, 0.8, 0.5),
        colors: &["yellow", "orange", "white"],
        features: &["small_beak", "delicate_build"],
    },
    Species {
        id: "budgie",
        name: "Budgie",
        template: Template::BirdSmall,
        scale: 0.18,
        proportions: (0.7, 0.9, 0.5),
        colors: &["green_yellow", "blue", "white"],
        features: &["curved_beak", "striped_pattern"],
    },
    Species {
        id: "parrot",
        name: "Parrot",
        template: Template::BirdMedium,
        scale: 0.4,
        proportions: (1.0, 1.2, 0.6),
        colors: &["green_red", "blue_yellow", "grey"],
        features: &["large_beak", "colorful_plumage"],
    },
    Species {
        id: "chicken",
        name: "Chicken",
        template: Template::BirdMedium,
        scale: 0.5,
        proportions: (1.2, 1.0, 0.8),
        colors: &["brown", "white", "black", "red_brown"],
        features: &["comb", "wattles", "ground_bird"],
    },
    Species {
        id: "snake",
        name: "Snake",
        template: Template::ReptileSnake,
        scale: 1.5,
        proportions: (8.0, 0.3, 0.3),
        colors: &["green", "brown", "patterned"],
        features: &["scales", "forked_tongue", "flexible_body"],
    },
    Species {
        id: "lizard",
        name: "Lizard",
        template: Template::ReptileLizard,
        scale: 0.3,
        proportions: (1.5, 0.4, 0.4),
        colors: &["green", "brown", "blue"],
        features: &["scales", "long_tail", "climbing_feet"],
    },
    Species {
        id: "turtle",
        name: "Turtle",
        template: Template::ReptileTurtle,
        scale: 0.6,
        proportions: (1.0, 0.6, 1.0),
        colors: &["green_brown", "olive", "dark_green"],
        features: &["shell", "retractable_head", "webbed_feet"],
    },
    Species {
        id: "goldfish",
        name: "Goldfish",
        template: Template::Fish,
        scale: 0.2,
        proportions: (1.0, 0.6, 0.4),
        colors: &["gold", "orange", "white", "calico"],
        features: &["fins", "scales", "gills"],
    },
];

pub(super) fn entries() -> Vec<CatalogEntry> {
    SPECIES.iter().map(to_entry).collect()
}

fn to_entry(species: &Species) -> CatalogEntry {
    let (length, height, width) = species.proportions;
    let proportions = BodyProportions {
        length,
        height,
        width,
    };

    // Organ offsets are authored for a unit body; stretch them along each axis.
    let markers = ORGAN_OFFSETS
        .iter()
        .map(|(name, [x, y, z])| {
            AnatomyMarker::new(
                *name,
                [
                    x * species.scale * length,
                    y * species.scale * width,
                    z * species.scale * height,
                ],
            )
        })
        .collect();

    CatalogEntry {
        id: species.id.to_string(),
        display_name: species.name.to_string(),
        template: species.template,
        scale: species.scale,
        proportions,
        colors: species.colors.iter().map(|c| c.to_string()).collect(),
        features: species.features.iter().map(|f| f.to_string()).collect(),
        tiers: TIER_NAMES.iter().map(|t| t.to_string()).collect(),
        modes: VisualizationMode::ALL.to_vec(),
        markers,
    }
}
