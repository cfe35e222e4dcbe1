use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, AUDIO_BASE_URL};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordEntry {
    pub word: String,
    pub part_of_speech: Option<String>,
    pub syllables: Option<String>,
    pub pronunciations: Vec<Pronunciation>,
    pub etymology: Option<String>,
    pub definitions: Vec<Definition>,
    pub scraped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pronunciation {
    pub text: String,
    pub audio_dir: Option<String>,
    pub audio_file: Option<String>,
    pub audio_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub definition_number: usize,
    pub definition_text: String,
    pub examples: Vec<Example>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub text: String,
    pub attribution: Option<String>,
}

#[inline]
pub(crate) fn create_selector(sel_str: &str) -> Result<Selector> {
    Selector::parse(sel_str).map_err(|_| Error::ParseInvalidSelector(sel_str.into()))
}

/// Text nodes trimmed and joined with single spaces.
fn spaced_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text nodes trimmed and glued together, non-breaking spaces removed.
fn compact_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .collect::<String>()
        .replace('\u{a0}', "")
        .trim()
        .to_string()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Parses a dictionary entry page into a [`WordEntry`].
pub fn parse_entry(word: &str, html: &str) -> Result<WordEntry> {
    let doc = Html::parse_document(html);

    let pos_selector = create_selector("span.fl")?;
    let pron_selector = create_selector("span.prons-entries-list-inline a.play-pron-v2")?;
    let etym_selector = create_selector("p.et")?;
    let sense_selector = create_selector("div.sense")?;
    let dt_selector = create_selector("span.dtText")?;
    let example_selector = create_selector("span.ex-sent")?;
    let auth_selector = create_selector("span.auth")?;

    let part_of_speech = doc
        .select(&pos_selector)
        .next()
        .and_then(|el| non_empty(compact_text(el)));

    let mut pronunciations = Vec::new();
    for link in doc.select(&pron_selector) {
        let text = compact_text(link);
        if text.is_empty() {
            continue;
        }
        let audio_dir = link.value().attr("data-dir").map(str::to_string);
        let audio_file = link.value().attr("data-file").map(str::to_string);
        let audio_url = match (&audio_dir, &audio_file) {
            (Some(dir), Some(file)) if !dir.is_empty() && !file.is_empty() => {
                Some(format!("{AUDIO_BASE_URL}/{dir}/{file}.mp3"))
            }
            _ => None,
        };
        pronunciations.push(Pronunciation {
            text,
            audio_dir,
            audio_file,
            audio_url,
        });
    }
    let syllables = pronunciations.first().map(|p| p.text.clone());

    let etymology = doc
        .select(&etym_selector)
        .next()
        .and_then(|el| non_empty(el.text().collect::<String>().trim().to_string()));

    let mut definitions = Vec::new();
    // Numbering follows the sense position, also counting senses without a definition.
    for (number, sense) in doc.select(&sense_selector).enumerate() {
        let Some(dt) = sense.select(&dt_selector).next() else {
            continue;
        };
        let mut definition_text = spaced_text(dt);
        if let Some(stripped) = definition_text.strip_prefix(": ") {
            definition_text = stripped.to_string();
        }

        let examples = sense
            .select(&example_selector)
            .map(|ex| Example {
                text: spaced_text(ex),
                attribution: ex
                    .select(&auth_selector)
                    .next()
                    .and_then(|a| non_empty(compact_text(a))),
            })
            .collect();

        definitions.push(Definition {
            definition_number: number + 1,
            definition_text,
            examples,
        });
    }

    Ok(WordEntry {
        word: word.to_string(),
        part_of_speech,
        syllables,
        pronunciations,
        etymology,
        definitions,
        scraped_at: Utc::now(),
    })
}

/// Collects text pronunciations, trying progressively looser markup until one matches.
pub fn parse_text_pronunciations(html: &str) -> Result<Vec<String>> {
    let doc = Html::parse_document(html);
    let attempts = [
        "span.prons-entries-list-inline div.prons-entry-list-item span.mw",
        "span.mw",
        "span.pron-spell-content, span.pr",
        "span.ipa",
    ];

    for sel_str in attempts {
        let selector = create_selector(sel_str)?;
        let mut found: Vec<String> = Vec::new();
        for el in doc.select(&selector) {
            let text = compact_text(el);
            if !text.is_empty() && !found.contains(&text) {
                found.push(text);
            }
        }
        if !found.is_empty() {
            return Ok(found);
        }
    }
    Ok(Vec::new())
}

/// Words listed on a browse page.
pub fn parse_browse_words(html: &str) -> Result<Vec<String>> {
    let doc = Html::parse_document(html);
    let word_selector = create_selector("div.mw-grid-table-list li")?;
    Ok(doc
        .select(&word_selector)
        .map(|li| li.text().collect::<String>().trim().to_string())
        .filter(|w| !w.is_empty())
        .collect())
}

/// Total page count from the "page 1 of N" counter on a browse page.
pub fn parse_page_count(html: &str) -> Result<Option<usize>> {
    let doc = Html::parse_document(html);
    let counter_selector = create_selector("span.counters")?;
    Ok(doc.select(&counter_selector).next().and_then(|el| {
        el.text()
            .collect::<String>()
            .rsplit("of")
            .next()
            .and_then(|n| n.trim().parse().ok())
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY_HTML: &str = r#"
<html><body>
  <h1 class="hword">apple</h1>
  <span class="fl">noun</span>
  <span class="prons-entries-list-inline">
    <a class="play-pron-v2" data-dir="a" data-file="apple001">ˈa-pəl&nbsp;</a>
    <a class="play-pron-v2" data-dir="" data-file="">ˈæpəl</a>
    <a class="play-pron-v2">  </a>
  </span>
  <p class="et">Middle English appel, from Old English æppel</p>
  <div class="sense">
    <span class="dtText"><strong>: </strong>the fleshy, usually rounded red, yellow, or green edible pome fruit</span>
    <span class="ex-sent">an <em>apple</em> a day <span class="auth">Proverb</span></span>
    <span class="ex-sent">apple pie</span>
  </div>
  <div class="sense"><span class="sn">b</span></div>
  <div class="sense">
    <span class="dtText">: a fruit or other vegetative growth suggestive of an apple</span>
  </div>
</body></html>"#;

    #[test]
    fn entry_fields() {
        let entry = parse_entry("apple", ENTRY_HTML).unwrap();
        assert_eq!(entry.word, "apple");
        assert_eq!(entry.part_of_speech.as_deref(), Some("noun"));
        assert_eq!(entry.syllables.as_deref(), Some("ˈa-pəl"));
        assert_eq!(
            entry.etymology.as_deref(),
            Some("Middle English appel, from Old English æppel")
        );

        assert_eq!(entry.pronunciations.len(), 2);
        assert_eq!(
            entry.pronunciations[0].audio_url.as_deref(),
            Some("https://media.merriam-webster.com/audio/prons/en/us/mp3/a/apple001.mp3")
        );
        assert_eq!(entry.pronunciations[1].audio_url, None);
    }

    #[test]
    fn definitions_are_numbered_by_sense_position() {
        let entry = parse_entry("apple", ENTRY_HTML).unwrap();
        assert_eq!(entry.definitions.len(), 2);

        let first = &entry.definitions[0];
        assert_eq!(first.definition_number, 1);
        assert!(first.definition_text.starts_with("the fleshy"));
        assert_eq!(first.examples.len(), 2);
        assert_eq!(first.examples[0].attribution.as_deref(), Some("Proverb"));
        assert_eq!(first.examples[1].attribution, None);

        let second = &entry.definitions[1];
        assert_eq!(second.definition_number, 3);
        assert!(second.definition_text.starts_with("a fruit"));
    }

    #[test]
    fn empty_page_gives_empty_entry() {
        let entry = parse_entry("zzxq", "<html></html>").unwrap();
        assert!(entry.part_of_speech.is_none());
        assert!(entry.definitions.is_empty());
        assert!(entry.pronunciations.is_empty());
    }

    #[test]
    fn text_pronunciations_prefer_entry_list() {
        let html = r#"
<span class="prons-entries-list-inline">
  <div class="prons-entry-list-item"><span class="mw">ˈa-pəl</span></div>
  <div class="prons-entry-list-item"><span class="mw">ˈa-pəl</span></div>
  <div class="prons-entry-list-item"><span class="mw">ˈä-pəl</span></div>
</span>
<span class="mw">ignored</span>"#;
        assert_eq!(
            parse_text_pronunciations(html).unwrap(),
            vec!["ˈa-pəl", "ˈä-pəl"]
        );
    }

    #[test]
    fn text_pronunciations_fall_back() {
        let html = r#"<div><span class="pr">ˈbā&nbsp;</span><span class="ipa">beɪ</span></div>"#;
        assert_eq!(parse_text_pronunciations(html).unwrap(), vec!["ˈbā"]);

        let html = r#"<div><span class="ipa">beɪ</span></div>"#;
        assert_eq!(parse_text_pronunciations(html).unwrap(), vec!["beɪ"]);

        assert!(parse_text_pronunciations("<p>nothing</p>").unwrap().is_empty());
    }

    #[test]
    fn browse_page_words_and_count() {
        let html = r#"
<div class="mw-grid-table-list"><ul>
  <li><a href="/dictionary/a">a</a></li>
  <li><a href="/dictionary/aardvark"> aardvark </a></li>
  <li></li>
</ul></div>
<span class="counters">page 1 of 58</span>"#;
        assert_eq!(parse_browse_words(html).unwrap(), vec!["a", "aardvark"]);
        assert_eq!(parse_page_count(html).unwrap(), Some(58));
        assert_eq!(parse_page_count("<html></html>").unwrap(), None);
    }
}
