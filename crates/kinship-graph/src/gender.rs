//! Gendered relationship vocabulary.
//!
//! Maps gendered terms ("mother", "uncle") to a canonical genderless kind
//! plus the gender they imply, knows each kind's reciprocal, and renders a
//! canonical kind back into a display term for a target of known gender.

use std::collections::HashMap;

use kinship_core::Gender;
use once_cell::sync::Lazy;

/// One canonical relationship kind with its display forms.
#[derive(Debug, Clone, Copy)]
struct KindForms {
    kind: &'static str,
    male: &'static str,
    female: &'static str,
    nonbinary: &'static str,
    /// Shown when the target's gender is unknown.
    neutral: &'static str,
    reciprocal: Option<&'static str>,
}

const fn forms(
    kind: &'static str,
    male: &'static str,
    female: &'static str,
    nonbinary: &'static str,
    neutral: &'static str,
    reciprocal: Option<&'static str>,
) -> KindForms {
    KindForms {
        kind,
        male,
        female,
        nonbinary,
        neutral,
        reciprocal,
    }
}

const fn plain(kind: &'static str, reciprocal: Option<&'static str>) -> KindForms {
    forms(kind, kind, kind, kind, kind, reciprocal)
}

static KINDS: &[KindForms] = &[
    forms("parent", "father", "mother", "parent", "parent", Some("child")),
    forms("child", "son", "daughter", "child", "child", Some("parent")),
    forms("sibling", "brother", "sister", "sibling", "sibling", Some("sibling")),
    forms("spouse", "husband", "wife", "spouse", "spouse", Some("spouse")),
    forms("partner", "boyfriend", "girlfriend", "partner", "partner", Some("partner")),
    forms("grandparent", "grandfather", "grandmother", "grandparent", "grandparent", Some("grandchild")),
    forms("grandchild", "grandson", "granddaughter", "grandchild", "grandchild", Some("grandparent")),
    forms("auncle", "uncle", "aunt", "pibling", "aunt/uncle", Some("nibling")),
    forms("nibling", "nephew", "niece", "nibling", "niece/nephew", Some("auncle")),
    forms("stepparent", "stepfather", "stepmother", "stepparent", "stepparent", Some("stepchild")),
    forms("stepchild", "stepson", "stepdaughter", "stepchild", "stepchild", Some("stepparent")),
    forms("godparent", "godfather", "godmother", "godparent", "godparent", Some("godchild")),
    forms("godchild", "godson", "goddaughter", "godchild", "godchild", Some("godparent")),
    plain("cousin", Some("cousin")),
    plain("friend", Some("friend")),
    plain("colleague", None),
    plain("mentor", None),
    plain("acquaintance", None),
    plain("neighbor", None),
    plain("contact", None),
    plain("kin", None),
];

/// Informal terms that are not display forms of any kind.
static SYNONYMS: &[(&str, &str, Option<Gender>)] = &[
    ("mom", "parent", Some(Gender::Female)),
    ("mum", "parent", Some(Gender::Female)),
    ("dad", "parent", Some(Gender::Male)),
    ("grandma", "grandparent", Some(Gender::Female)),
    ("grandpa", "grandparent", Some(Gender::Male)),
    ("uncle/aunt", "auncle", None),
    ("nephew/niece", "nibling", None),
];

/// Result of normalizing a raw relationship term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedKind {
    pub kind: String,
    pub implied_gender: Option<Gender>,
}

/// Immutable lookup tables, built once per process.
pub struct GenderTables {
    terms: HashMap<&'static str, (&'static str, Option<Gender>)>,
    kinds: HashMap<&'static str, KindForms>,
}

static TABLES: Lazy<GenderTables> = Lazy::new(GenderTables::build);

impl GenderTables {
    /// The process-wide tables.
    pub fn get() -> &'static GenderTables {
        &TABLES
    }

    fn build() -> Self {
        let mut terms = HashMap::new();
        let mut kinds = HashMap::new();

        for forms in KINDS {
            kinds.insert(forms.kind, *forms);
            // Neutral forms first so a gendered spelling never gets shadowed.
            terms.insert(forms.kind, (forms.kind, None));
            terms.insert(forms.neutral, (forms.kind, None));
            terms.entry(forms.nonbinary).or_insert((forms.kind, Some(Gender::NonBinary)));
            if forms.male != forms.kind {
                terms.insert(forms.male, (forms.kind, Some(Gender::Male)));
            }
            if forms.female != forms.kind {
                terms.insert(forms.female, (forms.kind, Some(Gender::Female)));
            }
        }
        for (term, kind, gender) in SYNONYMS {
            terms.insert(*term, (*kind, *gender));
        }

        Self { terms, kinds }
    }

    /// Map a raw term to its canonical kind and implied gender.
    ///
    /// Unknown terms pass through lowercased with no implied gender. Runs
    /// of whitespace become a single `-`, so every kind is one word in the
    /// Related section grammar.
    pub fn normalize(&self, raw: &str) -> NormalizedKind {
        let lowered = raw
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
            .to_lowercase();
        match self.terms.get(lowered.as_str()) {
            Some((kind, gender)) => NormalizedKind {
                kind: (*kind).to_string(),
                implied_gender: *gender,
            },
            None => NormalizedKind {
                kind: lowered,
                implied_gender: None,
            },
        }
    }

    /// The reciprocal kind. Symmetric kinds return themselves.
    pub fn reciprocal(&self, kind: &str) -> Option<&'static str> {
        self.kinds.get(kind).and_then(|f| f.reciprocal)
    }

    pub fn is_symmetric(&self, kind: &str) -> bool {
        self.reciprocal(kind) == Some(kind)
    }

    /// Render a canonical kind for a target of the given gender.
    pub fn render(&self, kind: &str, target_gender: Option<Gender>) -> String {
        let Some(forms) = self.kinds.get(kind) else {
            return kind.to_string();
        };
        let term = match target_gender {
            Some(Gender::Male) => forms.male,
            Some(Gender::Female) => forms.female,
            Some(Gender::NonBinary) => forms.nonbinary,
            None => forms.neutral,
        };
        term.to_string()
    }
}
