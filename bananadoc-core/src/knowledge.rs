//! Static reference text for each deficiency class the classifier can emit.

use serde::Serialize;

const NOT_AVAILABLE: &str = "Information not available";

/// Labels in the order the client lists them.
pub const KNOWN_LABELS: [&str; 9] = [
    "Boron",
    "Calcium",
    "Healthy",
    "Iron",
    "Magnesium",
    "Manganese",
    "Potassium",
    "Sulphur",
    "Zinc",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeficiencyInfo {
    pub symptoms: &'static str,
    pub treatment: &'static str,
    pub prevention: &'static str,
}

/// Look up the explanation for a label. Unknown labels get placeholder text.
pub fn info_for(label: &str) -> DeficiencyInfo {
    let (symptoms, treatment, prevention) = match label {
        "Boron" => (
            "Stunted growth, brittle, thick, and curled leaves. The leaf tips become dry and necrotic.",
            "Apply borax or other boron fertilizers at recommended rates. Foliar spray of 0.1% to 0.25% borax solution.",
            "Regular soil testing, maintaining proper soil pH, and adding organic matter to soil.",
        ),
        "Calcium" => (
            "Young leaves are distorted with hooked tips and dead margins. The leaf lamina is reduced.",
            "Apply calcium nitrate, calcium sulfate (gypsum) or lime. Foliar spray with calcium chloride.",
            "Maintain proper soil pH, avoid excess potassium fertilization, ensure proper irrigation.",
        ),
        "Healthy" => (
            "No symptoms of nutrient deficiency. Leaves are vibrant green with proper size and shape.",
            "Continue with balanced fertilization and proper care.",
            "Regular soil testing, balanced fertilization, and proper watering practices.",
        ),
        "Iron" => (
            "Interveinal yellowing (chlorosis) of young leaves while veins remain green. Severe cases show whitish or pale yellow leaves.",
            "Apply iron sulfate or iron chelates. Foliar spray with 0.5% to 1% ferrous sulfate solution.",
            "Maintain proper soil pH (6.0-6.5), avoid waterlogging, add organic matter to soil.",
        ),
        "Magnesium" => (
            "Interveinal chlorosis starting from leaf margins and progressing inward, typically on older leaves. Orange-yellow discoloration with green veins.",
            "Apply Epsom salts (magnesium sulfate) or dolomitic limestone. Foliar spray with 2% magnesium sulfate solution.",
            "Regular soil testing, avoid excess potassium application, maintain proper pH.",
        ),
        "Manganese" => (
            "Interveinal chlorosis with a checkered pattern, usually on younger leaves. Reduced leaf size and deformed leaf edges.",
            "Apply manganese sulfate to soil or as foliar spray (0.1% to 0.5% solution).",
            "Maintain proper soil pH, avoid over-liming, ensure good drainage.",
        ),
        "Potassium" => (
            "Chlorosis and necrosis at leaf margins of older leaves, orange-yellow color. Premature leaf fall.",
            "Apply potassium sulfate, potassium chloride, or potassium nitrate. Foliar spray with 1-2% potassium sulfate.",
            "Regular soil testing, balanced fertilization with NPK, add organic matter to soil.",
        ),
        "Sulphur" => (
            "Uniform yellowing of younger leaves. Stunted growth and delayed fruiting.",
            "Apply elemental sulfur, ammonium sulfate, or gypsum. Foliar spray is not very effective for sulfur.",
            "Use sulfur-containing fertilizers periodically, add organic matter to soil.",
        ),
        "Zinc" => (
            "Small, narrow leaves with interveinal chlorosis. Shortened internodes leading to rosette appearance.",
            "Apply zinc sulfate to soil or as foliar spray (0.1% to 0.5% solution). Use zinc chelates for better absorption.",
            "Maintain proper soil pH, avoid excessive phosphorus application, add organic matter.",
        ),
        _ => (NOT_AVAILABLE, NOT_AVAILABLE, NOT_AVAILABLE),
    };

    DeficiencyInfo {
        symptoms,
        treatment,
        prevention,
    }
}

pub fn all_labels() -> &'static [&'static str] {
    &KNOWN_LABELS
}
