//! Official syllabus topics and mapping of free-text topics onto them.

use crate::config::Subject;

const PHYSICS_TOPICS: &[&str] = &[
    "Electric Charges and Fields",
    "Electrostatic Potential and Capacitance",
    "Current Electricity",
    "Moving Charges and Magnetism",
    "Magnetism and Matter",
    "Electromagnetic Induction",
    "Alternating Current",
    "Electromagnetic Waves",
    "Ray Optics and Optical Instruments",
    "Wave Optics",
    "Dual Nature of Radiation and Matter",
    "Atoms",
    "Nuclei",
    "Semiconductor Electronics",
];

const CHEMISTRY_TOPICS: &[&str] = &[
    "Solutions",
    "Electrochemistry",
    "Chemical Kinetics",
    "Surface Chemistry",
    "General Principles and Processes of Isolation of Elements",
    "p-Block Elements",
    "d and f Block Elements",
    "Coordination Compounds",
    "Haloalkanes and Haloarenes",
    "Alcohols Phenols and Ethers",
    "Aldehydes Ketones and Carboxylic Acids",
    "Amines",
    "Biomolecules",
    "Chemistry in Everyday Life",
];

const BIOLOGY_TOPICS: &[&str] = &[
    "Sexual Reproduction in Flowering Plants",
    "Principles of Inheritance and Variation",
    "Molecular Basis of Inheritance",
    "Biotechnology Principles and Processes",
    "Biotechnology and its Applications",
    "Organisms and Populations",
    "Ecosystem",
    "Biodiversity and Conservation",
    "Human Reproduction",
    "Reproductive Health",
    "Human Health and Disease",
    "Evolution",
];

const MATH_TOPICS: &[&str] = &[
    "Relations and Functions",
    "Inverse Trigonometric Functions",
    "Matrices",
    "Determinants",
    "Continuity and Differentiability",
    "Applications of Derivatives",
    "Integrals",
    "Applications of Integrals",
    "Differential Equations",
    "Vectors",
    "Three Dimensional Geometry",
    "Linear Programming",
    "Probability",
];

type Aliases = &'static [(&'static str, Option<&'static str>)];

const PHYSICS_ALIASES: Aliases = &[
    ("Electrostatics", Some("Electric Charges and Fields")),
    ("Coulombs Law", Some("Electric Charges and Fields")),
    ("Electric Field", Some("Electric Charges and Fields")),
    ("Capacitors", Some("Electrostatic Potential and Capacitance")),
    ("Current", Some("Current Electricity")),
    ("Ohms Law", Some("Current Electricity")),
    ("Kirchhoffs Laws", Some("Current Electricity")),
    ("Magnetism", Some("Moving Charges and Magnetism")),
    ("Magnetic Force", Some("Moving Charges and Magnetism")),
    ("EM Induction", Some("Electromagnetic Induction")),
    ("Faradays Law", Some("Electromagnetic Induction")),
    ("AC Circuits", Some("Alternating Current")),
    ("Optics", Some("Ray Optics and Optical Instruments")),
    ("Refraction", Some("Ray Optics and Optical Instruments")),
    ("Interference", Some("Wave Optics")),
    ("Diffraction", Some("Wave Optics")),
    ("Photoelectric Effect", Some("Dual Nature of Radiation and Matter")),
    ("Bohrs Model", Some("Atoms")),
    ("Radioactivity", Some("Nuclei")),
    ("Diodes", Some("Semiconductor Electronics")),
    ("Transistors", Some("Semiconductor Electronics")),
];

const CHEMISTRY_ALIASES: Aliases = &[
    ("Raoults Law", Some("Solutions")),
    ("Colligative Properties", Some("Solutions")),
    ("Electrochemical Cells", Some("Electrochemistry")),
    ("Nernst Equation", Some("Electrochemistry")),
    ("Rate of Reaction", Some("Chemical Kinetics")),
    ("Arrhenius Equation", Some("Chemical Kinetics")),
    ("Adsorption", Some("Surface Chemistry")),
    ("Colloids", Some("Surface Chemistry")),
    (
        "Metallurgy",
        Some("General Principles and Processes of Isolation of Elements"),
    ),
    ("p-Block", Some("p-Block Elements")),
    ("Transition Elements", Some("d and f Block Elements")),
    ("d-Block", Some("d and f Block Elements")),
    ("Coordination Chemistry", Some("Coordination Compounds")),
    ("Haloalkanes", Some("Haloalkanes and Haloarenes")),
    ("Alcohols", Some("Alcohols Phenols and Ethers")),
    ("Phenols", Some("Alcohols Phenols and Ethers")),
    ("Aldehydes", Some("Aldehydes Ketones and Carboxylic Acids")),
    ("Ketones", Some("Aldehydes Ketones and Carboxylic Acids")),
    ("Carboxylic Acids", Some("Aldehydes Ketones and Carboxylic Acids")),
    ("Carbohydrates", Some("Biomolecules")),
    ("Proteins", Some("Biomolecules")),
    ("Polymers", Some("Chemistry in Everyday Life")),
];

const BIOLOGY_ALIASES: Aliases = &[
    ("Reproduction in Plants", Some("Sexual Reproduction in Flowering Plants")),
    ("Pollination", Some("Sexual Reproduction in Flowering Plants")),
    ("Genetics", Some("Principles of Inheritance and Variation")),
    ("Mendels Laws", Some("Principles of Inheritance and Variation")),
    ("DNA", Some("Molecular Basis of Inheritance")),
    ("RNA", Some("Molecular Basis of Inheritance")),
    ("Genetic Engineering", Some("Biotechnology Principles and Processes")),
    ("PCR", Some("Biotechnology Principles and Processes")),
    ("GM Crops", Some("Biotechnology and its Applications")),
    ("Population Ecology", Some("Organisms and Populations")),
    ("Food Chain", Some("Ecosystem")),
    ("Energy Flow", Some("Ecosystem")),
    ("Conservation", Some("Biodiversity and Conservation")),
    ("Gametogenesis", Some("Human Reproduction")),
    ("Fertilization", Some("Human Reproduction")),
    ("Birth Control", Some("Reproductive Health")),
    ("Immunity", Some("Human Health and Disease")),
    ("Vaccines", Some("Human Health and Disease")),
    ("Natural Selection", Some("Evolution")),
    ("Human Evolution", Some("Evolution")),
];

/// `None` marks topics outside the syllabus; they never fall through to
/// fuzzy matching.
const MATH_ALIASES: Aliases = &[
    ("Functions", Some("Relations and Functions")),
    ("Relation", Some("Relations and Functions")),
    ("Function", Some("Relations and Functions")),
    ("Inverse Trig", Some("Inverse Trigonometric Functions")),
    ("Inverse Trigonometric Function", Some("Inverse Trigonometric Functions")),
    ("Matrix", Some("Matrices")),
    ("Determinant", Some("Determinants")),
    ("Limits", Some("Continuity and Differentiability")),
    ("Limits and Derivatives", Some("Continuity and Differentiability")),
    ("Derivatives", Some("Continuity and Differentiability")),
    ("Differentiation", Some("Continuity and Differentiability")),
    ("Continuity", Some("Continuity and Differentiability")),
    ("Differentiability", Some("Continuity and Differentiability")),
    ("Application of Derivatives", Some("Applications of Derivatives")),
    ("Application of Derivative", Some("Applications of Derivatives")),
    ("Maxima Minima", Some("Applications of Derivatives")),
    ("Integration", Some("Integrals")),
    ("Definite Integrals", Some("Integrals")),
    ("Integral", Some("Integrals")),
    ("Application of Integrals", Some("Applications of Integrals")),
    ("Application of Integral", Some("Applications of Integrals")),
    ("Area Under Curve", Some("Applications of Integrals")),
    ("Differential Equation", Some("Differential Equations")),
    ("Vector Algebra", Some("Vectors")),
    ("Vector", Some("Vectors")),
    ("3D Geometry", Some("Three Dimensional Geometry")),
    ("Three-Dimensional Geometry", Some("Three Dimensional Geometry")),
    ("LPP", Some("Linear Programming")),
    ("Probability Distribution", Some("Probability")),
    ("Statistics", Some("Probability")),
    ("Permutations and Combinations", None),
    ("Permutation", None),
    ("Combination", None),
    ("Sequences and Series", None),
    ("Sequence", None),
    ("Series", None),
    ("Complex Numbers", None),
    ("Complex Number", None),
    ("General", None),
    ("Mathematics", None),
    ("Math", None),
];

/// Official topic names for `subject`, in syllabus order.
pub fn official_topics(subject: Subject) -> &'static [&'static str] {
    match subject {
        Subject::Math => MATH_TOPICS,
        Subject::Physics => PHYSICS_TOPICS,
        Subject::Chemistry => CHEMISTRY_TOPICS,
        Subject::Biology => BIOLOGY_TOPICS,
    }
}

fn aliases(subject: Subject) -> Aliases {
    match subject {
        Subject::Math => MATH_ALIASES,
        Subject::Physics => PHYSICS_ALIASES,
        Subject::Chemistry => CHEMISTRY_ALIASES,
        Subject::Biology => BIOLOGY_ALIASES,
    }
}

/// True when `topic` is exactly one of the official names of `subject`.
pub fn is_official_topic(topic: &str, subject: Subject) -> bool {
    official_topics(subject).contains(&topic)
}

/// Maps a free-text topic onto the official taxonomy of `subject`.
///
/// Tiers, first hit wins:
/// 1. case-insensitive exact match with an official name
/// 2. case-insensitive exact match with an alias; an alias mapped to no
///    topic ends the search with `None`
/// 3. substring containment in either direction
/// 4. overlap of words longer than four characters
///
/// # Returns
///
/// The official topic name, or `None` when the topic should stay unmapped.
pub fn match_topic(free_text: &str, subject: Subject) -> Option<&'static str> {
    let normalized = free_text.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }
    let official = official_topics(subject);

    if let Some(topic) = official.iter().find(|t| t.to_lowercase() == normalized) {
        return Some(*topic);
    }

    if let Some((_, target)) = aliases(subject)
        .iter()
        .find(|(alias, _)| alias.to_lowercase() == normalized)
    {
        return *target;
    }

    if let Some(topic) = official.iter().find(|t| {
        let t = t.to_lowercase();
        normalized.contains(&t) || t.contains(&normalized)
    }) {
        return Some(*topic);
    }

    let words: Vec<&str> = normalized
        .split_whitespace()
        .filter(|w| w.chars().count() > 4)
        .collect();
    official
        .iter()
        .find(|t| {
            let t = t.to_lowercase();
            t.split_whitespace()
                .filter(|tw| tw.chars().count() > 4)
                .any(|tw| words.iter().any(|w| tw.contains(w) || w.contains(tw)))
        })
        .copied()
}

/// Prompt fragment listing the official topics of `subject`.
pub fn topic_instruction(subject: Subject) -> String {
    let list: Vec<String> = official_topics(subject)
        .iter()
        .enumerate()
        .map(|(i, t)| format!("{}. \"{}\"", i + 1, t))
        .collect();
    format!(
        "Use only these official {} topic names for the topic field, copied exactly:\n{}",
        subject,
        list.join("\n")
    )
}
