//! Prompt sent to the vision model with every uploaded leaf image.
//!
//! The JSON keys listed here are the ones the normalizer reads back.

/// Instruction asking for a strict JSON leaf diagnosis.
pub const LEAF_DIAGNOSIS_PROMPT: &str = r#"You are an expert plant pathologist. Analyze the attached image of a plant leaf and diagnose any disease, pest damage or nutrient deficiency.

Your response MUST be valid JSON in this exact format:
{
  "disease_detected": true,
  "disease_name": "name of the disease, or null if healthy",
  "disease_type": "fungal | bacterial | viral | pest | nutrient | healthy | invalid_image",
  "severity": "mild | moderate | severe, or null if healthy",
  "confidence": 85.0,
  "symptoms": ["visible symptom"],
  "possible_causes": ["likely cause"],
  "treatment": ["recommended treatment"]
}

Guidelines:
- confidence is a percentage between 0 and 100
- If the leaf is healthy, set disease_detected to false and disease_type to "healthy"
- If the image does not show a plant leaf, set disease_detected to false, disease_type to "invalid_image", confidence to 0, and explain the problem in symptoms and treatment
- symptoms, possible_causes and treatment are arrays of short strings

Always respond with valid JSON only, no other text."#;

/// Keys the prompt asks the model to return.
pub const DIAGNOSIS_KEYS: [&str; 8] = [
    "disease_detected",
    "disease_name",
    "disease_type",
    "severity",
    "confidence",
    "symptoms",
    "possible_causes",
    "treatment",
];
