use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VoiceCategory {
    Male,
    Female,
    Neutral,
}

/// Prebuilt provider voice
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Voice {
    /// Identifier sent to the provider
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: VoiceCategory,
    pub languages: &'static [&'static str],
}

const fn voice(
    id: &'static str,
    description: &'static str,
    category: VoiceCategory,
    languages: &'static [&'static str],
) -> Voice {
    named(id, id, description, category, languages)
}

const fn named(
    id: &'static str,
    name: &'static str,
    description: &'static str,
    category: VoiceCategory,
    languages: &'static [&'static str],
) -> Voice {
    Voice {
        id,
        name,
        description,
        category,
        languages,
    }
}

use VoiceCategory::{Female, Male, Neutral};

/// Gemini prebuilt voices; the id is also the display name
pub const GEMINI_VOICES: &[Voice] = &[
    voice("Zephyr", "Bright", Neutral, &["en-US"]),
    voice("Puck", "Upbeat", Male, &["en-US"]),
    voice("Charon", "Informative", Male, &["en-US"]),
    voice("Kore", "Firm", Female, &["pt-BR", "en-US"]),
    voice("Fenrir", "Excitable", Male, &["en-US"]),
    voice("Leda", "Youthful", Female, &["en-US"]),
    voice("Orus", "Firm", Male, &["pt-BR"]),
    voice("Aoede", "Breezy", Female, &["en-US"]),
    voice("Callirrhoe", "Easy-going", Female, &["en-US"]),
    voice("Autonoe", "Bright", Female, &["en-US"]),
    voice("Enceladus", "Breathy", Male, &["en-US"]),
    voice("Iapetus", "Clear", Male, &["en-US"]),
    voice("Umbriel", "Easy-going", Male, &["en-US"]),
    voice("Algieba", "Smooth", Male, &["es-US"]),
    voice("Despina", "Smooth", Female, &["es-US"]),
    voice("Erinome", "Clear", Female, &["fr-FR"]),
    voice("Algenib", "Gravelly", Male, &["fr-FR"]),
    voice("Rasalgethi", "Informative", Male, &["de-DE"]),
    voice("Laomedeia", "Upbeat", Female, &["de-DE"]),
];

/// ElevenLabs premade voices, addressed by opaque voice id
pub const ELEVENLABS_VOICES: &[Voice] = &[
    named("EXAVITQu4vr4xnSDxMaL", "Sarah", "Soft, confident", Female, &["en-US"]),
    named("XrExE9yKIg1WjnnlVkGX", "Matilda", "Young, energetic", Female, &["en-US"]),
    named("cgSgspJ2msm6clMCkdW9", "Jessica", "Warm, expressive", Female, &["en-US"]),
    named("21m00Tcm4TlvDq8ikWAM", "Rachel", "Calm", Female, &["en-US"]),
    named("AZnzlk1XvdvUeBnXmlld", "Domi", "Strong, assertive", Female, &["en-US"]),
    named("MF3mGyEYCl7XYWbV9V6O", "Elli", "Emotional", Female, &["en-US"]),
    named("ThT5KcBeYPX3keUQqHPh", "Dorothy", "Pleasant, young", Female, &["en-US"]),
    named("SOYHLrjzK2X1ezoPC6cr", "Grace", "Elegant", Female, &["en-US"]),
    named("Xb7hH8MSUJpSbSDYk0k2", "Alice", "Confident, newsy", Female, &["en-GB"]),
    named("pFZP5JQG7iQjIQuC4Bku", "Lily", "Soft, warm", Female, &["en-GB"]),
    named("oWAxZDx7w5VEj9dCyTzz", "Glinda", "Young, sweet", Female, &["en-GB"]),
    named("XB0fDUnXU5powFXDhCwa", "Charlotte", "Versatile", Female, &["multilingual"]),
    named("9BWtsMINqrJLrRacOk9x", "Aria", "Expressive", Female, &["multilingual"]),
    named("FGY2WhTYpPnrIDTdsKH5", "Laura", "Warm, expressive", Female, &["es-ES"]),
    named("g5CIjZEefAph4nQFvHAz", "Freya", "Young, modern", Female, &["en-US"]),
    named("jBpfuIE2acCO8z3wKNLl", "Gigi", "Childlike", Female, &["en-US"]),
    named("jsCqWAovK2LkecY7zXl4", "Freya Alt", "Natural", Female, &["en-US"]),
    named("LcfcDJNUP1GQjkzn1xUU", "Emily", "Calm, soft", Female, &["en-US"]),
    named("N2lVS1w4EtoT3dr4eOWO", "Callum", "Intense", Male, &["en-US"]),
    named("SAz9YHcvj6GT2YYXdXww", "River", "Soft, confident", Male, &["en-US"]),
    named("bIHbv24MWmeRgasZH58o", "Will", "Friendly", Male, &["en-US"]),
    named("cjVigY5qzO86Huf0OWal", "Eric", "Mature, authoritative", Male, &["en-US"]),
    named("iP95p4xoKVk53GoZ742B", "Chris", "Casual", Male, &["en-US"]),
    named("nPczCjzI2devNBz1zQrb", "Brian", "Clear", Male, &["en-US"]),
    named("pqHfZKP75CvOlQylNhV4", "Bill", "Strong", Male, &["en-US"]),
    named("2EiwWnXFnvU5JabPnv8n", "Clyde", "Deep narrator", Male, &["en-US"]),
    named("VR6AewLTigWG4xSOukaG", "Arnold", "Mature", Male, &["en-US"]),
    named("yoZ06aMxZJJ28mfd3POQ", "Sam", "Narrator", Male, &["en-US"]),
    named("CYw3kZ02Hs0563khs1Fj", "Dave", "Conversational", Male, &["en-GB"]),
    named("5Q0t7uMcjvnagumLfvZi", "Ethan", "Soft", Male, &["en-US"]),
    named("JBFqnCBsd6RMkjVDRZzb", "George", "Mature, authoritative", Male, &["en-GB"]),
    named("onwK4e9ZLuTAKqWW03F9", "Daniel", "Deep, confident", Male, &["en-GB"]),
    named("Zlb1dXrM653N07WRdFW3", "Harry", "Young, energetic", Male, &["en-GB"]),
    named("pNInz6obpgDQGcFmaJgB", "Adam", "Deep narrator", Male, &["en-US"]),
    named("TX3LPaxmHKxFdv7VOQHJ", "Liam", "Natural", Male, &["multilingual"]),
    named("IKne3meq5aSn9XLyUdCD", "Charlie", "Casual, friendly", Male, &["en-AU"]),
    named("CwhRBWXzGAHq8TQ4Fs17", "Roger", "Warm, expressive", Male, &["pt-BR"]),
    named("flq6f7yk4E4fJM5XTYuZ", "Michael", "Old American", Male, &["en-US"]),
    named("t0jbNlBVZ17f02VDIeMI", "Jeremy", "Young Irish-American", Male, &["en-US"]),
    named("TxGEqnHWrfWFTfGW9XjX", "Josh", "Young, warm", Male, &["en-US"]),
    named("29vD33N1CtxCmqQRPOHJ", "Drew", "Deep bass", Male, &["en-US"]),
    named("ODq5zmih8GrVes37Dizd", "Patrick", "Young", Male, &["en-US"]),
    named("piTKgcLEGmPE4e6mEKli", "Nicole", "Whispery", Female, &["en-US"]),
    named("XdZlITNJpFe1D9LRBHNu", "Serena", "Pleasant, young", Female, &["en-US"]),
    named("GBv7mTt0atIp3Br8iCZE", "Thomas", "Calm, mature", Male, &["en-US"]),
    named("ErXwobaYiN019PkySvjV", "Antoni", "Well-rounded", Male, &["en-US"]),
    named("z9fAnlkpzviPz146aGWa", "Mimi", "Sweet", Female, &["en-US"]),
    named("pMsXgVXv3BLzUgSXRplE", "Fin", "Young Irish", Male, &["en-IE"]),
    named("D38z5RcWu1voky8WS1ja", "Fin Alt", "Young Irish", Male, &["en-IE"]),
    named("EUqf4LPJNbC7WrCdC4P8", "Giovanni", "Theatrical", Male, &["en-US"]),
    named("11b7hJI1yiXr0w8SrL2t", "Tim", "Quirky", Male, &["en-US"]),
];

/// Gemini voice by id
pub fn find_voice(id: &str) -> Option<&'static Voice> {
    GEMINI_VOICES.iter().find(|voice| voice.id == id)
}

/// Look a voice up in a catalog by id or, failing that, by display name
pub fn resolve_voice(catalog: &'static [Voice], voice: &str) -> Option<&'static Voice> {
    catalog
        .iter()
        .find(|candidate| candidate.id == voice)
        .or_else(|| {
            catalog
                .iter()
                .find(|candidate| candidate.name.eq_ignore_ascii_case(voice))
        })
}

/// Primary language the provider should speak for a voice, `en-US` when unknown
pub fn language_for_voice(id: &str) -> &'static str {
    find_voice(id)
        .and_then(|voice| voice.languages.first().copied())
        .unwrap_or("en-US")
}
