use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use super::dom::Document;
use super::{resolve_locator, Annotation, ChapterCtx, Problem, ProblemKind, Verse};

/// Entry ids look like "cen-NRSVUE-2B"; the trailing uppercase run is the
/// letter code shared by all targets bundled in the entry.
static LETTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z]+-[A-Za-z]+-\d+([A-Z]+)").unwrap());

/// Attach the chapter's cross-reference list to the verses it annotates.
/// Target references are kept verbatim, one annotation per comma-separated
/// target; only the source locator is resolved.
pub fn link(
    ctx: &ChapterCtx,
    doc: &Document,
    verses: &mut [Verse],
    problems: &mut Vec<Problem>,
) {
    let Some(container) = doc.find_first(|el| el.name == "div" && el.has_class("crossrefs"))
    else {
        return;
    };

    let mut current_letter: Option<String> = None;

    for li in doc.find_all_in(container, |el| el.name == "li") {
        let el = doc.element(li).unwrap();
        let id_attr = el.id.clone().unwrap_or_default();
        let Some(letter) = LETTER_RE
            .captures(&id_attr)
            .map(|caps| caps[1].to_string())
        else {
            problems.push(ctx.problem(None, ProblemKind::MalformedIdentifier(id_attr)));
            continue;
        };

        if ctx.config.profile.single_crossref_group {
            if let Some(had) = &current_letter {
                if *had != letter {
                    warn!(
                        "crossref letter group changed mid-list: {} -> {}",
                        had, letter
                    );
                    problems.push(ctx.problem(
                        None,
                        ProblemKind::AnomalousLetterGroup {
                            had: had.clone(),
                            found: letter.clone(),
                        },
                    ));
                }
            }
        }
        current_letter = Some(letter.clone());

        let Some(anchor) = doc.find_first_in(li, |el| el.name == "a") else {
            problems.push(ctx.problem(None, ProblemKind::MalformedIdentifier(id_attr)));
            continue;
        };
        let source = doc.text_of(anchor);

        // The full target list lives in the crossref link's data attribute.
        let Some(raw_targets) = doc
            .find_first_in(li, |el| el.name == "a" && el.has_class("crossref-link"))
            .and_then(|a| doc.element(a).unwrap().attr("data-bibleref"))
            .map(str::to_string)
        else {
            problems.push(ctx.problem(None, ProblemKind::MalformedIdentifier(id_attr)));
            continue;
        };
        let targets: Vec<&str> = raw_targets
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();

        match resolve_locator(ctx, &source) {
            Ok(ranges) => {
                let source_id = ranges[0].first_id();
                match verses.iter_mut().find(|v| v.verse_id == source_id) {
                    Some(verse) => {
                        for target in targets {
                            verse.crossrefs.push(Annotation {
                                letter: letter.clone(),
                                text: target.to_string(),
                            });
                        }
                    }
                    None => {
                        problems
                            .push(ctx.problem(None, ProblemKind::UnresolvedReference(source)));
                    }
                }
            }
            Err(_) => {
                problems.push(ctx.problem(None, ProblemKind::UnresolvedReference(source)));
            }
        }
    }
}

// ── Tests ──
