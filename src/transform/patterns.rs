//! Per-language templates marking featured and good articles

use super::TransformError;
use regex_lite::Regex;

/// (language key, featured article, featured list, good article)
type PatternRow = (&'static str, Option<&'static str>, Option<&'static str>, Option<&'static str>);

const FEATURED_EN: &str = r"\{\{[Ff]eatured [Aa]rticle\}\}";
const FEATURED_LOOSE: &str = r"\{\{[Ff]eatured.*[Aa]rticle\}\}";
const GOOD_EN: &str = r"\{\{[Gg]ood [Aa]rticle\}\}";

static PATTERN_TABLE: &[PatternRow] = &[
    (
        "dewiki",
        Some(r"\{\{[Ee]xzellent\|.*\|[0-9]*\}\}"),
        Some(r"\{\{[Ii]nformativ\}\}"),
        Some(r"\{\{[Ll]esenswert\|.*\|[0-9]*\}\}"),
    ),
    ("enwiki", Some(FEATURED_EN), Some(r"\{\{[Ff]eatured [Ll]ist\}\}"), Some(GOOD_EN)),
    (
        "eswiki",
        Some(r"\{\{[Aa]rt.*culo [Dd]estacado\}\}"),
        None,
        Some(r"\{\{[Aa]rt.*culo [Bb]ueno\}\}"),
    ),
    (
        "frwiki",
        Some(r"\{\{Article de qualit.*\|.*\}\}"),
        None,
        Some(r"\{\{[Bb]on [Aa]rticle\|.*\}\}"),
    ),
    ("itwiki", Some(r"\{\{[Vv]etrina\|.*\}\}"), None, Some(r"\{\{Voce di qualità\|.*\}\}")),
    ("jawiki", Some(FEATURED_LOOSE), None, Some(GOOD_EN)),
    ("nlwiki", Some(r"\{\{[Ee]talage\}\}"), None, None),
    ("plwiki", Some(r"\{\{[Mm]edal\}\}"), None, Some(r"\{\{[Dd]obry [Aa]rtykuł\}\}")),
    ("ptwiki", Some(r"\{\{[Aa]rtigo [Dd]estacado\}\}"), None, Some(r"\{\{[Aa]rtigo [Bb]om\}\}")),
    (
        "ruwiki",
        Some(r"\{\{Избранная статья\|.*\}\}"),
        None,
        Some(r"\{\{Хорошая статья\|.*\}\}"),
    ),
    ("zhwiki", Some(FEATURED_LOOSE), None, None),
    ("svwiki", Some(r"\{\{[Uu]tm.*rkt\}\}"), None, None),
    ("trwiki", Some(r"\{\{[Ss]eçkin [Mm]adde\}\}"), None, None),
    ("fiwiki", Some(r"\{\{[Ss]uositeltu\}\}"), None, None),
    ("cswiki", Some(r"\{\{[Nn]ejlepší článek\}\}"), None, None),
    ("idwiki", Some(FEATURED_LOOSE), None, None),
    ("thwiki", Some(r"\{\{บทความคัดสรร\}\}"), None, None),
    ("arwiki", Some(r"\{\{مقالة مختارة\}\}"), None, None),
    ("kowiki", Some(r"\{\{알찬 글 딱지\}\}"), None, None),
    ("hewiki", Some(r"\{\{ערך מומלץ\}\}"), None, None),
    ("nowiki", Some(r"\{\{[Uu]tmerket\}\}"), None, None),
    ("huwiki", Some(r"\{\{[Kk]iemelt.*\}\}"), None, None),
    ("viwiki", Some(r"\{\{[Ss]ao chọn lọc.*\}\}"), None, None),
    ("ukwiki", Some(r"\{\{медаль.*\}\}"), None, None),
    ("dawiki", Some(r"\{\{[Ff]remragende.*\}\}"), None, Some(r"\{\{[Gg]od\}\}")),
    ("fawiki", Some(r"\{\{مقاله برگزیده\}\}|\{\{نوشتار برگزیده\}\}"), None, None),
    ("rowiki", Some(r"\{\{[Aa]rticol de [Cc]alitate\}\}"), None, None),
    ("cawiki", Some(r"\{\{[Aa]rticle de [Qq]ualitat\}\}|\{\{1000\+AdQ.*\}\}"), None, None),
    ("bgwiki", Some(r"\{\{Избрана статия.*\}\}"), None, None),
    ("hrwiki", Some(r"\{\{[Ii]zdvojeni članak.*\}\}"), None, None),
    ("elwiki", Some(r"\{\{[Αα]ξιόλογο άρθρο\}\}"), None, None),
    ("skwiki", Some(r"\{\{[Pp]erfektný článok\}\}"), None, None),
    ("srwiki", Some(r"\{\{изабрани\}\}"), None, None),
    ("ltwiki", Some(r"\{\{SavStr\}\}"), None, None),
    ("slwiki", Some(r"\{\{zvezdica\}\}"), None, None),
    ("etwiki", Some(r"\{\{eeskujulikud artiklid\}\}"), None, None),
    ("mswiki", Some(r"\{\{rencana pilihan\}\}"), None, None),
    ("euwiki", Some(r"\{\{[Nn]abarmendutako artikulua\}\}"), None, None),
    ("glwiki", Some(r"\{\{[Aa]rtigo de calidade\}\}"), None, None),
    ("simplewiki", Some(FEATURED_EN), None, None),
    ("iswiki", Some(r"\{\{Úrvalsgrein\}\}"), None, Some(r"\{\{Gæðagrein\}\}")),
    ("fowiki", Some(r"\{\{Mánaðargrein\}\}"), None, None),
    ("scowiki", None, None, None),
    ("furwiki", None, None, None),
];

/// Whether a language key has a pattern set
pub fn is_supported_language(language: &str) -> bool {
    PATTERN_TABLE.iter().any(|row| row.0 == language)
}

/// Language keys with a pattern set, in table order
pub fn supported_languages() -> impl Iterator<Item = &'static str> {
    PATTERN_TABLE.iter().map(|row| row.0)
}

/// Compiled classification templates for one language
#[derive(Debug, Clone)]
pub struct ClassificationPatterns {
    language: String,
    featured_article: Option<Regex>,
    featured_list: Option<Regex>,
    good_article: Option<Regex>,
}

impl ClassificationPatterns {
    /// Look up and compile the patterns of a language key such as `enwiki`
    pub fn for_language(language: &str) -> Result<Self, TransformError> {
        let (_, fa, flist, ga) = PATTERN_TABLE
            .iter()
            .find(|row| row.0 == language)
            .ok_or_else(|| TransformError::UnsupportedLanguage(language.to_string()))?;

        Ok(Self {
            language: language.to_string(),
            featured_article: compile(*fa)?,
            featured_list: compile(*flist)?,
            good_article: compile(*ga)?,
        })
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn is_featured_article(&self, text: &str) -> bool {
        matches(&self.featured_article, text)
    }

    pub fn is_featured_list(&self, text: &str) -> bool {
        matches(&self.featured_list, text)
    }

    pub fn is_good_article(&self, text: &str) -> bool {
        matches(&self.good_article, text)
    }
}

fn compile(pattern: Option<&str>) -> Result<Option<Regex>, TransformError> {
    pattern
        .map(|p| {
            Regex::new(p).map_err(|e| TransformError::InvalidPattern {
                pattern: p.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}

fn matches(pattern: &Option<Regex>, text: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_language_compiles() {
        for language in supported_languages() {
            assert!(
                ClassificationPatterns::for_language(language).is_ok(),
                "patterns for {} failed to compile",
                language
            );
        }
    }

    #[test]
    fn test_unknown_language_fails_fast() {
        let err = ClassificationPatterns::for_language("xxwiki").unwrap_err();
        assert!(matches!(err, TransformError::UnsupportedLanguage(ref l) if l == "xxwiki"));
        assert!(!is_supported_language("xxwiki"));
    }

    #[test]
    fn test_english_templates() {
        let patterns = ClassificationPatterns::for_language("enwiki").unwrap();
        assert!(patterns.is_featured_article("intro {{featured article}} more"));
        assert!(patterns.is_featured_list("{{Featured list}}"));
        assert!(patterns.is_good_article("{{Good article}}"));
        assert!(!patterns.is_good_article("{{Featured article}}"));
    }

    #[test]
    fn test_flags_are_independent() {
        let patterns = ClassificationPatterns::for_language("dewiki").unwrap();
        let text = "{{Exzellent|1. Mai 2005|123}} {{Lesenswert|2004|99}}";
        assert!(patterns.is_featured_article(text));
        assert!(patterns.is_good_article(text));
        assert!(!patterns.is_featured_list(text));
    }

    #[test]
    fn test_missing_pattern_is_never_a_match() {
        let patterns = ClassificationPatterns::for_language("scowiki").unwrap();
        assert!(!patterns.is_featured_article("{{Featured article}}"));
        let patterns = ClassificationPatterns::for_language("nlwiki").unwrap();
        assert!(!patterns.is_good_article("{{Good article}}"));
    }

    #[test]
    fn test_alternative_templates() {
        let patterns = ClassificationPatterns::for_language("cawiki").unwrap();
        assert!(patterns.is_featured_article("{{1000+AdQ|x}}"));
        assert!(patterns.is_featured_article("{{Article de qualitat}}"));
    }
}
