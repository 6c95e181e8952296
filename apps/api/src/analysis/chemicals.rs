//! Additive detection against a static database of preservatives, colors,
//! sweeteners, emulsifiers and flavor enhancers.
//!
//! Three passes run over normalized label text and are merged per additive,
//! keeping the strongest hit:
//! 1. regex patterns (colors, E-numbers, compound names) at 0.9
//! 2. whole-word name (0.95) and alias (0.8) matches
//! 3. common misspellings at 0.7

use std::collections::{BTreeMap, HashSet};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use crate::analysis::models::{ChemicalAnalysis, ChemicalInfo, RiskLevel};

const CONTEXT_RADIUS: usize = 30;

const DEFAULT_HEALTH_EFFECTS: &[&str] = &["Potential health concerns - consult healthcare provider"];
const DEFAULT_ALTERNATIVES: &[&str] = &[
    "Look for organic alternatives",
    "Choose products with natural ingredients",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdditiveCategory {
    Preservatives,
    ArtificialColors,
    Sweeteners,
    Emulsifiers,
    FlavorEnhancers,
}

impl AdditiveCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdditiveCategory::Preservatives => "preservatives",
            AdditiveCategory::ArtificialColors => "artificial_colors",
            AdditiveCategory::Sweeteners => "sweeteners",
            AdditiveCategory::Emulsifiers => "emulsifiers",
            AdditiveCategory::FlavorEnhancers => "flavor_enhancers",
        }
    }
}

#[derive(Debug)]
pub struct AdditiveEntry {
    pub key: &'static str,
    pub name: &'static str,
    pub category: AdditiveCategory,
    pub risk_level: RiskLevel,
    pub description: &'static str,
    pub e_numbers: &'static [&'static str],
    pub aliases: &'static [&'static str],
    pub health_effects: &'static [&'static str],
    pub alternatives: &'static [&'static str],
}

use AdditiveCategory::*;

pub static ADDITIVES: &[AdditiveEntry] = &[
    // Preservatives
    AdditiveEntry {
        key: "bha",
        name: "BHA",
        category: Preservatives,
        risk_level: RiskLevel::High,
        description: "Butylated hydroxyanisole - potential carcinogen",
        e_numbers: &["320"],
        aliases: &["butylated hydroxyanisole"],
        health_effects: &["Potential carcinogen", "May cause allergic reactions"],
        alternatives: &["Vitamin E (tocopherols)", "Rosemary extract"],
    },
    AdditiveEntry {
        key: "bht",
        name: "BHT",
        category: Preservatives,
        risk_level: RiskLevel::High,
        description: "Butylated hydroxytoluene - potential carcinogen",
        e_numbers: &["321"],
        aliases: &["butylated hydroxytoluene"],
        health_effects: &["Potential carcinogen", "May affect liver function"],
        alternatives: &["Vitamin E (tocopherols)", "Ascorbic acid"],
    },
    AdditiveEntry {
        key: "tbhq",
        name: "TBHQ",
        category: Preservatives,
        risk_level: RiskLevel::High,
        description: "Tertiary butylhydroquinone - synthetic antioxidant with limited safety margin",
        e_numbers: &["319"],
        aliases: &["tertiary butylhydroquinone"],
        health_effects: &[],
        alternatives: &["Vitamin E (tocopherols)", "Rosemary extract"],
    },
    AdditiveEntry {
        key: "sodium_benzoate",
        name: "Sodium Benzoate",
        category: Preservatives,
        risk_level: RiskLevel::Medium,
        description: "May form benzene when combined with vitamin C",
        e_numbers: &["211"],
        aliases: &["benzoate of soda"],
        health_effects: &[],
        alternatives: &[],
    },
    AdditiveEntry {
        key: "potassium_sorbate",
        name: "Potassium Sorbate",
        category: Preservatives,
        risk_level: RiskLevel::Low,
        description: "Generally recognized as safe",
        e_numbers: &["202"],
        aliases: &["sorbate of potash"],
        health_effects: &[],
        alternatives: &[],
    },
    AdditiveEntry {
        key: "sodium_nitrite",
        name: "Sodium Nitrite",
        category: Preservatives,
        risk_level: RiskLevel::High,
        description: "May form nitrosamines, potential carcinogens",
        e_numbers: &["250"],
        aliases: &["nitrite"],
        health_effects: &[
            "May form carcinogenic nitrosamines",
            "Linked to colorectal cancer",
        ],
        alternatives: &["Celery powder", "Sea salt"],
    },
    AdditiveEntry {
        key: "sodium_nitrate",
        name: "Sodium Nitrate",
        category: Preservatives,
        risk_level: RiskLevel::High,
        description: "May form nitrosamines, potential carcinogens",
        e_numbers: &["251"],
        aliases: &["nitrate"],
        health_effects: &[],
        alternatives: &["Celery powder", "Sea salt"],
    },
    AdditiveEntry {
        key: "sulfur_dioxide",
        name: "Sulfur Dioxide",
        category: Preservatives,
        risk_level: RiskLevel::Medium,
        description: "May cause allergic reactions in sensitive individuals",
        e_numbers: &["220"],
        aliases: &["sulphur dioxide"],
        health_effects: &[],
        alternatives: &[],
    },
    // Artificial colors
    AdditiveEntry {
        key: "red_40",
        name: "Red 40",
        category: ArtificialColors,
        risk_level: RiskLevel::Medium,
        description: "May cause hyperactivity in children",
        e_numbers: &["129"],
        aliases: &["allura red"],
        health_effects: &[
            "May cause hyperactivity in children",
            "Potential allergic reactions",
        ],
        alternatives: &["Beet juice", "Paprika extract", "Annatto"],
    },
    AdditiveEntry {
        key: "yellow_5",
        name: "Yellow 5",
        category: ArtificialColors,
        risk_level: RiskLevel::Medium,
        description: "May cause allergic reactions",
        e_numbers: &["102"],
        aliases: &["tartrazine"],
        health_effects: &[],
        alternatives: &["Turmeric", "Saffron"],
    },
    AdditiveEntry {
        key: "yellow_6",
        name: "Yellow 6",
        category: ArtificialColors,
        risk_level: RiskLevel::Medium,
        description: "May cause hyperactivity in children",
        e_numbers: &["110"],
        aliases: &["sunset yellow"],
        health_effects: &[],
        alternatives: &["Paprika extract", "Annatto"],
    },
    AdditiveEntry {
        key: "blue_1",
        name: "Blue 1",
        category: ArtificialColors,
        risk_level: RiskLevel::Medium,
        description: "May cause allergic reactions",
        e_numbers: &["133"],
        aliases: &["brilliant blue"],
        health_effects: &[],
        alternatives: &["Spirulina extract"],
    },
    AdditiveEntry {
        key: "caramel_color",
        name: "Caramel Color",
        category: ArtificialColors,
        risk_level: RiskLevel::Medium,
        description: "May contain 4-methylimidazole",
        e_numbers: &["150", "150a", "150b", "150c", "150d"],
        aliases: &["caramel colour"],
        health_effects: &[],
        alternatives: &[],
    },
    // Sweeteners
    AdditiveEntry {
        key: "aspartame",
        name: "Aspartame",
        category: Sweeteners,
        risk_level: RiskLevel::Medium,
        description: "Avoid if phenylketonuria",
        e_numbers: &["951"],
        aliases: &["nutrasweet"],
        health_effects: &["May cause headaches", "Not suitable for phenylketonuria"],
        alternatives: &["Stevia", "Monk fruit extract"],
    },
    AdditiveEntry {
        key: "sucralose",
        name: "Sucralose",
        category: Sweeteners,
        risk_level: RiskLevel::Low,
        description: "Generally recognized as safe",
        e_numbers: &["955"],
        aliases: &["splenda"],
        health_effects: &[],
        alternatives: &[],
    },
    AdditiveEntry {
        key: "acesulfame_k",
        name: "Acesulfame K",
        category: Sweeteners,
        risk_level: RiskLevel::Medium,
        description: "Limited long-term studies",
        e_numbers: &["950"],
        aliases: &["acesulfame potassium", "ace-k"],
        health_effects: &[],
        alternatives: &["Stevia", "Monk fruit extract"],
    },
    AdditiveEntry {
        key: "high_fructose_corn_syrup",
        name: "High Fructose Corn Syrup",
        category: Sweeteners,
        risk_level: RiskLevel::High,
        description: "Linked to obesity and diabetes",
        e_numbers: &[],
        aliases: &["hfcs", "glucose-fructose"],
        health_effects: &["Linked to obesity", "May contribute to diabetes"],
        alternatives: &["Pure cane sugar", "Honey", "Maple syrup"],
    },
    AdditiveEntry {
        key: "saccharin",
        name: "Saccharin",
        category: Sweeteners,
        risk_level: RiskLevel::Medium,
        description: "Potential bladder cancer risk in animal studies",
        e_numbers: &["954"],
        aliases: &[],
        health_effects: &[],
        alternatives: &["Stevia"],
    },
    AdditiveEntry {
        key: "cyclamate",
        name: "Cyclamate",
        category: Sweeteners,
        risk_level: RiskLevel::Medium,
        description: "Banned in some countries due to cancer concerns",
        e_numbers: &["952"],
        aliases: &[],
        health_effects: &[],
        alternatives: &["Stevia"],
    },
    // Emulsifiers
    AdditiveEntry {
        key: "polysorbate_80",
        name: "Polysorbate 80",
        category: Emulsifiers,
        risk_level: RiskLevel::Medium,
        description: "May affect gut microbiome",
        e_numbers: &["433"],
        aliases: &["tween 80"],
        health_effects: &[],
        alternatives: &[],
    },
    AdditiveEntry {
        key: "polysorbate_60",
        name: "Polysorbate 60",
        category: Emulsifiers,
        risk_level: RiskLevel::Medium,
        description: "May affect gut microbiome",
        e_numbers: &["435"],
        aliases: &["tween 60"],
        health_effects: &[],
        alternatives: &[],
    },
    AdditiveEntry {
        key: "carrageenan",
        name: "Carrageenan",
        category: Emulsifiers,
        risk_level: RiskLevel::Medium,
        description: "May cause digestive inflammation",
        e_numbers: &["407"],
        aliases: &["irish moss extract"],
        health_effects: &[
            "May cause digestive inflammation",
            "Potential gut irritation",
        ],
        alternatives: &["Agar", "Gellan gum"],
    },
    AdditiveEntry {
        key: "lecithin",
        name: "Lecithin",
        category: Emulsifiers,
        risk_level: RiskLevel::Low,
        description: "Generally recognized as safe",
        e_numbers: &["322"],
        aliases: &["soy lecithin", "sunflower lecithin"],
        health_effects: &[],
        alternatives: &[],
    },
    AdditiveEntry {
        key: "sodium_stearoyl_lactylate",
        name: "Sodium Stearoyl Lactylate",
        category: Emulsifiers,
        risk_level: RiskLevel::Low,
        description: "Generally recognized as safe",
        e_numbers: &["481"],
        aliases: &[],
        health_effects: &[],
        alternatives: &[],
    },
    // Flavor enhancers
    AdditiveEntry {
        key: "monosodium_glutamate",
        name: "Monosodium Glutamate (MSG)",
        category: FlavorEnhancers,
        risk_level: RiskLevel::Medium,
        description: "May cause headaches and nausea in sensitive individuals",
        e_numbers: &["621"],
        aliases: &["msg", "sodium glutamate", "glutamic acid"],
        health_effects: &[
            "May cause headaches",
            "Can trigger nausea in sensitive individuals",
        ],
        alternatives: &["Natural herbs and spices", "Nutritional yeast"],
    },
    AdditiveEntry {
        key: "disodium_guanylate",
        name: "Disodium Guanylate",
        category: FlavorEnhancers,
        risk_level: RiskLevel::Low,
        description: "Generally recognized as safe",
        e_numbers: &["627"],
        aliases: &[],
        health_effects: &[],
        alternatives: &[],
    },
];

pub fn lookup(key: &str) -> Option<&'static AdditiveEntry> {
    ADDITIVES.iter().find(|a| a.key == key)
}

fn lookup_e_number(number: &str) -> Option<&'static AdditiveEntry> {
    ADDITIVES
        .iter()
        .find(|a| a.e_numbers.iter().any(|e| *e == number))
}

/// How a regex match is turned into an additive key.
enum KeySource {
    Fixed(&'static str),
    /// All capture groups joined with `_`, e.g. `red` + `40` -> `red_40`.
    JoinedGroups,
    /// Fixed prefix plus the first capture group, e.g. `polysorbate` + `80`.
    Numbered(&'static str),
    ENumber,
}

struct DetectionPattern {
    regex: Regex,
    key: KeySource,
}

fn detection(pattern: &str, key: KeySource) -> DetectionPattern {
    DetectionPattern {
        regex: Regex::new(pattern).expect("detection pattern must compile"),
        key,
    }
}

static PATTERNS: Lazy<Vec<DetectionPattern>> = Lazy::new(|| {
    use KeySource::*;
    vec![
        detection(r"\be\s*-?\s*(\d{3}[a-d]?)\b", ENumber),
        detection(
            r"\b(sodium|potassium|calcium)\s+(benzoate|sorbate|nitrite|nitrate)\b",
            JoinedGroups,
        ),
        detection(r"\b(bha|bht|tbhq)\b", JoinedGroups),
        detection(r"\bsulfur\s+dioxide\b", Fixed("sulfur_dioxide")),
        detection(
            r"\b(?:fd&c\s+|fdc\s+)?(red|yellow|blue|green)\s+(?:dye\s+)?(?:no\.?\s*|#\s*)?(\d+)\b",
            JoinedGroups,
        ),
        detection(r"\bcaramel\s+colou?r\b", Fixed("caramel_color")),
        detection(r"\btartrazine\b", Fixed("yellow_5")),
        detection(r"\b(aspartame|sucralose|saccharin|cyclamate)\b", JoinedGroups),
        detection(r"\bacesulfame[\s-]*(?:k|potassium)\b", Fixed("acesulfame_k")),
        detection(
            r"\bhigh[\s-]+fructose\s+corn\s+syrup\b",
            Fixed("high_fructose_corn_syrup"),
        ),
        detection(
            r"\b(?:monosodium\s+glutamate|msg)\b",
            Fixed("monosodium_glutamate"),
        ),
        detection(r"\bpolysorbate\s*(60|80)\b", Numbered("polysorbate")),
    ]
});

/// Whole-word regexes for each additive's display phrase and aliases.
static KEYWORDS: Lazy<Vec<(&'static AdditiveEntry, Regex, Vec<Regex>)>> = Lazy::new(|| {
    ADDITIVES
        .iter()
        .map(|entry| {
            let phrase = entry.key.replace('_', " ");
            let aliases = entry.aliases.iter().map(|a| word_regex(a)).collect();
            (entry, word_regex(&phrase), aliases)
        })
        .collect()
});

const MISSPELLINGS: &[(&str, &[&str])] = &[
    ("aspartame", &["aspartam", "asparteme"]),
    ("carrageenan", &["carragean", "caragenan"]),
    ("monosodium_glutamate", &["monosodium glutamat"]),
];

static PUNCTUATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[,;:]").expect("punctuation pattern must compile"));

fn word_regex(phrase: &str) -> Regex {
    Regex::new(&format!(r"\b{}\b", regex::escape(phrase))).expect("escaped phrase must compile")
}

#[derive(Debug, Clone)]
struct ChemicalMatch {
    entry: &'static AdditiveEntry,
    confidence: f32,
    context: String,
}

/// Lower-cases, turns `,;:` into spaces, collapses whitespace and fixes `|` misreads.
pub fn normalize_text(text: &str) -> String {
    let lower = text.to_lowercase().replace('|', "l");
    let spaced = PUNCTUATION_RE.replace_all(&lower, " ");
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Detects additives in label text, strongest match first, one entry per additive.
pub fn detect_chemicals(text: &str) -> Vec<ChemicalInfo> {
    if text.trim().is_empty() {
        return vec![];
    }

    let cleaned = normalize_text(text);

    let mut matches = pattern_matches(&cleaned);
    matches.extend(keyword_matches(&cleaned));
    matches.extend(misspelling_matches(&cleaned));

    let chemicals: Vec<ChemicalInfo> = deduplicate(matches)
        .into_iter()
        .map(to_chemical_info)
        .collect();

    debug!("Detected {} chemicals", chemicals.len());
    chemicals
}

fn pattern_matches(text: &str) -> Vec<ChemicalMatch> {
    let mut matches = Vec::new();
    for pattern in PATTERNS.iter() {
        for caps in pattern.regex.captures_iter(text) {
            let Some(entry) = resolve_key(&pattern.key, &caps) else {
                continue;
            };
            let Some(whole) = caps.get(0) else {
                continue;
            };
            matches.push(ChemicalMatch {
                entry,
                confidence: 0.9,
                context: context_around(text, whole.start(), whole.end()),
            });
        }
    }
    matches
}

fn resolve_key(source: &KeySource, caps: &Captures<'_>) -> Option<&'static AdditiveEntry> {
    match source {
        KeySource::ENumber => lookup_e_number(caps.get(1)?.as_str()),
        KeySource::Fixed(key) => lookup(key),
        KeySource::Numbered(prefix) => lookup(&format!("{}_{}", prefix, caps.get(1)?.as_str())),
        KeySource::JoinedGroups => {
            let key = caps
                .iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join("_");
            lookup(&key)
        }
    }
}

fn keyword_matches(text: &str) -> Vec<ChemicalMatch> {
    let mut matches = Vec::new();
    for (entry, name_re, alias_res) in KEYWORDS.iter() {
        if let Some(m) = name_re.find(text) {
            matches.push(ChemicalMatch {
                entry: *entry,
                confidence: 0.95,
                context: context_around(text, m.start(), m.end()),
            });
        }
        for alias_re in alias_res {
            if let Some(m) = alias_re.find(text) {
                matches.push(ChemicalMatch {
                    entry: *entry,
                    confidence: 0.8,
                    context: context_around(text, m.start(), m.end()),
                });
            }
        }
    }
    matches
}

fn misspelling_matches(text: &str) -> Vec<ChemicalMatch> {
    let mut matches = Vec::new();
    for (key, variants) in MISSPELLINGS {
        let Some(entry) = lookup(key) else {
            continue;
        };
        for variant in variants.iter() {
            if let Some(pos) = text.find(variant) {
                matches.push(ChemicalMatch {
                    entry,
                    confidence: 0.7,
                    context: context_around(text, pos, pos + variant.len()),
                });
            }
        }
    }
    matches
}

/// Keeps the highest-confidence match per additive; ties keep detection order.
fn deduplicate(mut matches: Vec<ChemicalMatch>) -> Vec<ChemicalMatch> {
    matches.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut seen = HashSet::new();
    matches
        .into_iter()
        .filter(|m| seen.insert(m.entry.key))
        .collect()
}

fn to_chemical_info(m: ChemicalMatch) -> ChemicalInfo {
    let entry = m.entry;
    let or_default = |items: &'static [&'static str], default: &'static [&'static str]| {
        let source = if items.is_empty() { default } else { items };
        source.iter().map(|s| s.to_string()).collect::<Vec<_>>()
    };
    ChemicalInfo {
        name: entry.name.to_string(),
        category: entry.category.as_str().to_string(),
        risk_level: entry.risk_level,
        description: entry.description.to_string(),
        health_effects: or_default(entry.health_effects, DEFAULT_HEALTH_EFFECTS),
        alternatives: or_default(entry.alternatives, DEFAULT_ALTERNATIVES),
        confidence: m.confidence,
        context: m.context,
    }
}

fn context_around(text: &str, start: usize, end: usize) -> String {
    let mut lo = start.saturating_sub(CONTEXT_RADIUS);
    while !text.is_char_boundary(lo) {
        lo -= 1;
    }
    let mut hi = (end + CONTEXT_RADIUS).min(text.len());
    while !text.is_char_boundary(hi) {
        hi += 1;
    }
    text[lo..hi].trim().to_string()
}

// ────────────────────────────────────────────────────────────────────────────
// Aggregate analysis
// ────────────────────────────────────────────────────────────────────────────

/// Detects additives and summarizes their risk.
pub fn analyze_chemicals(text: &str) -> ChemicalAnalysis {
    let detected = detect_chemicals(text);

    let mut risk_summary: BTreeMap<RiskLevel, u32> =
        RiskLevel::ALL.iter().map(|level| (*level, 0)).collect();
    for chemical in &detected {
        *risk_summary.entry(chemical.risk_level).or_insert(0) += 1;
    }

    ChemicalAnalysis {
        overall_risk_level: overall_risk(&detected),
        safety_score: safety_score(&detected),
        recommendations: chemical_recommendations(&detected),
        risk_summary,
        detected_chemicals: detected,
    }
}

/// Most severe level among detected additives; `Low` when none.
pub fn overall_risk(chemicals: &[ChemicalInfo]) -> RiskLevel {
    chemicals
        .iter()
        .map(|c| c.risk_level)
        .max()
        .unwrap_or(RiskLevel::Low)
}

/// 0 to 10, higher is safer. 9.0 with nothing detected, otherwise 8.0 minus a
/// per-additive penalty of 0.5 / 1 / 2 / 3 by risk level.
pub fn safety_score(chemicals: &[ChemicalInfo]) -> f64 {
    if chemicals.is_empty() {
        return 9.0;
    }
    let penalty: f64 = chemicals
        .iter()
        .map(|c| match c.risk_level {
            RiskLevel::Low => 0.5,
            RiskLevel::Medium => 1.0,
            RiskLevel::High => 2.0,
            RiskLevel::Critical => 3.0,
        })
        .sum();
    (8.0 - penalty).clamp(0.0, 10.0)
}

pub fn chemical_recommendations(chemicals: &[ChemicalInfo]) -> Vec<String> {
    if chemicals.is_empty() {
        return vec!["No concerning chemicals detected".to_string()];
    }

    let mut recommendations = Vec::new();
    if chemicals.iter().any(|c| c.risk_level >= RiskLevel::High) {
        recommendations
            .push("Contains high-risk chemical additives - consider alternatives".to_string());
        recommendations.push("Limit consumption frequency".to_string());
    }
    if chemicals
        .iter()
        .any(|c| c.category == Preservatives.as_str())
    {
        recommendations.push("Contains preservatives - check expiration dates".to_string());
    }
    if chemicals
        .iter()
        .any(|c| c.category == ArtificialColors.as_str())
    {
        recommendations.push(
            "Contains artificial colors - may cause reactions in sensitive individuals"
                .to_string(),
        );
    }
    recommendations
}
