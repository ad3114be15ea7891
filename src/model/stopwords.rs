//! Spanish stop words removed before building the vocabulary

use once_cell::sync::Lazy;
use std::collections::HashSet;

const SPANISH: &[&str] = &[
    "a", "al", "algo", "algunas", "algunos", "ante", "antes", "como", "con", "contra",
    "cual", "cuando", "de", "del", "desde", "donde", "durante", "e", "el", "ella",
    "ellas", "ellos", "en", "entre", "era", "erais", "eran", "eras", "eres", "es",
    "esa", "esas", "ese", "eso", "esos", "esta", "estaba", "estado", "estamos", "estan",
    "estar", "estas", "este", "esto", "estos", "estoy", "está", "están", "fue", "fueron",
    "fui", "ha", "habia", "había", "han", "has", "hasta", "hay", "he", "la",
    "las", "le", "les", "lo", "los", "me", "mi", "mis", "mucho", "muchos",
    "muy", "más", "mí", "nada", "ni", "no", "nos", "nosotros", "nuestra", "nuestras",
    "nuestro", "nuestros", "o", "os", "otra", "otras", "otro", "otros", "para", "pero",
    "poco", "por", "porque", "que", "quien", "quienes", "qué", "se", "sea", "sean",
    "ser", "si", "sido", "siendo", "sin", "sobre", "sois", "somos", "son", "soy",
    "su", "sus", "suya", "suyas", "suyo", "suyos", "sí", "también", "tanto", "te",
    "tendrá", "tenemos", "tener", "tengo", "ti", "tiene", "tienen", "todo", "todos", "tu",
    "tus", "tú", "un", "una", "uno", "unos", "vosotros", "y", "ya", "yo",
    "él", "éramos",
];

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| SPANISH.iter().copied().collect());

/// Whether a lowercased token is a Spanish stop word
pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(token)
}
