//! Prompt composition.
//!
//! Prompts are written in Dutch, the storefront language. The only
//! non-deterministic input is the subheading triplet, which is drawn from
//! [`HEADING_POOLS`] with a caller-supplied random source so tests can pin it.

use std::fmt::Write as _;

use catalog_core::{Mode, ProductAttributes, Tier};
use rand::seq::SliceRandom;
use rand::Rng;

/// Subheading triplets rotated across generations to vary page structure.
pub static HEADING_POOLS: [[&str; 3]; 12] = [
    ["Productomschrijving", "Belangrijkste kenmerken", "Geschikt voor"],
    ["Over dit product", "Details", "Gebruik"],
    ["Kenmerken", "Materiaal & Samenstelling", "Toepassing"],
    ["Beschrijving", "Specificaties", "Voor wie"],
    ["Productinformatie", "Wat maakt dit product bijzonder", "Gebruiksadvies"],
    ["Algemene informatie", "Eigenschappen", "Toepassingsgebied"],
    ["Over dit artikel", "Inhoud & Samenstelling", "Praktische informatie"],
    ["Productdetails", "Functie & Voordelen", "Aanbevolen gebruik"],
    ["Wat is dit product", "Technische kenmerken", "Doelgroep"],
    ["Korte toelichting", "Kenmerken op een rij", "Hoe te gebruiken"],
    ["Productbeschrijving", "Inhoud & formaat", "Waarvoor geschikt"],
    ["Introductie", "Wat je moet weten", "Gebruik & verzorging"],
];

/// Word range requested for the long description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordTarget {
    pub min: u32,
    pub max: u32,
}

pub fn long_word_target(tier: Tier) -> WordTarget {
    match tier {
        Tier::High => WordTarget { min: 350, max: 550 },
        Tier::Mid => WordTarget { min: 200, max: 350 },
        Tier::Low => WordTarget { min: 120, max: 180 },
    }
}

/// A composed prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompts {
    pub system: String,
    pub user: String,
    /// Subheadings requested from the model (empty unless mode is full).
    pub headings: Vec<String>,
}

/// Pick a subheading triplet.
pub fn pick_headings<R: Rng + ?Sized>(rng: &mut R) -> &'static [&'static str; 3] {
    HEADING_POOLS.choose(rng).unwrap_or(&HEADING_POOLS[0])
}

/// Build the system and user prompt for a product.
pub fn build<R: Rng + ?Sized>(
    product: &ProductAttributes,
    tier: Tier,
    mode: Mode,
    rng: &mut R,
) -> Prompts {
    let headings: Vec<String> = match mode {
        Mode::Full => pick_headings(rng).iter().map(|h| h.to_string()).collect(),
        Mode::ShortOnly | Mode::MetaOnly => Vec::new(),
    };

    Prompts {
        system: system_prompt(),
        user: user_prompt(product, tier, mode, &headings),
        headings,
    }
}

/// Persistent writing rules. The forbidden list mirrors the validator's
/// blocklist; the validator still re-checks every result.
pub fn system_prompt() -> String {
    let forbidden = content_guard::BLOCKED_TERMS
        .iter()
        .map(|term| format!("\"{}\"", term))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Je schrijft productteksten voor een Nederlandstalige webwinkel.\n\
         \n\
         TAAL: Schrijf alleen in helder, correct Nederlands. Gebruik geen Engelse woorden, \
         behalve als ze in de officiële productnaam staan. Houd de toon zakelijk en neutraal.\n\
         \n\
         INHOUD:\n\
         1. Baseer je uitsluitend op de aangeleverde productgegevens.\n\
         2. Verzin geen materialen, ingrediënten, eigenschappen of voordelen.\n\
         3. Doe geen medische, therapeutische of andere onbewezen beweringen.\n\
         4. Gebruik nooit deze termen: {forbidden}.\n\
         5. Geen overdreven verkooptaal en geen emoji.\n\
         6. Wissel zinsbouw af en vermijd standaardzinnen.\n\
         7. Is er weinig productinformatie, beschrijf het product dan op categorieniveau.\n\
         \n\
         UITVOER: Antwoord met precies één geldig JSON-object. Geen markdown, geen ``` blokken, \
         geen toelichting buiten de JSON. Begin met {{ en eindig met }}. Sluit elke string af \
         met een dubbel aanhalingsteken en escape aanhalingstekens binnen tekst."
    )
}

/// Product data, length targets and the output contract for one call.
pub fn user_prompt(
    product: &ProductAttributes,
    tier: Tier,
    mode: Mode,
    headings: &[String],
) -> String {
    let brand = non_empty(&product.brand).unwrap_or("onbekend");
    let category = non_empty(&product.category).unwrap_or("Algemeen");
    let attributes = if product.attributes.is_empty() {
        "niet opgegeven".to_string()
    } else {
        product.attributes.join(", ")
    };

    let mut prompt = String::new();
    let _ = writeln!(prompt, "Productgegevens:");
    let _ = writeln!(prompt, "Titel: {}", product.title);
    let _ = writeln!(prompt, "Merk: {}", brand);
    match non_empty(&product.subcategory) {
        Some(sub) => {
            let _ = writeln!(prompt, "Categorie: {} > {}", category, sub);
        }
        None => {
            let _ = writeln!(prompt, "Categorie: {}", category);
        }
    }
    let _ = writeln!(prompt, "Kenmerken: {}", attributes);
    prompt.push('\n');

    prompt.push_str(
        "Richtlijnen:\n\
         - Verwerk merk en categorie natuurlijk in de tekst.\n\
         - Noem kenmerken alleen als ze hierboven staan.\n\
         - Ontbreken kenmerken, blijf dan algemeen binnen de categorie.\n\
         - Haal alle minimale lengtes (woorden of tekens) die hieronder staan.\n\n",
    );

    prompt.push_str("Lever exact dit JSON-object:\n");
    prompt.push_str(&output_contract(tier, mode, headings));
    prompt
}

fn output_contract(tier: Tier, mode: Mode, headings: &[String]) -> String {
    const SHORT: &str = "VERPLICHT: 40-90 woorden. Eén openingszin gevolgd door 3-5 <ul><li> punten met neutrale producteigenschappen. Geen claims.";
    const META: &str = "VERPLICHT: 110-155 tekens. Neutraal en informatief, noemt het belangrijkste zoekwoord uit de titel één keer. Geen oproep tot kopen.";

    match mode {
        Mode::ShortOnly => format!("{{ \"short_description\": \"{}\" }}", SHORT),
        Mode::MetaOnly => format!("{{ \"meta_description\": \"{}\" }}", META),
        Mode::Full => {
            let target = long_word_target(tier);
            let heading_list = headings
                .iter()
                .map(|h| format!("<h3>{}</h3>", h))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "{{\n  \"short_description\": \"{short}\",\n  \"long_description\": \"HTML-beschrijving met precies deze {count} <h3>-koppen in deze volgorde: {heading_list}. MINIMAAL {min} woorden, streef naar {max}. Gebruik <ul><li> voor opsommingen en vul elke sectie inhoudelijk.\",\n  \"meta_description\": \"{meta} Patroon: [Merk] [Producttype] - neutrale samenvatting.\"\n}}",
                short = SHORT,
                count = headings.len(),
                min = target.min,
                max = target.max,
                meta = META,
            )
        }
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}
