//! Relaxed URL extraction over free text.
//!
//! Favours recall over RFC conformance: besides `scheme://` links it matches
//! `mailto:` links, e-mail addresses, and bare host names such as
//! `example.org/b` when they end in a known top-level domain. Trailing sentence
//! punctuation and unbalanced closing brackets are not part of a match.
use regex::Regex;
use std::sync::LazyLock;

const GENERIC_TLDS: &[&str] = &[
    "aero", "app", "art", "asia", "biz", "blog", "cat", "cloud", "club", "com", "coop", "design",
    "dev", "edu", "email", "gov", "info", "int", "jobs", "link", "live", "media", "mil", "mobi",
    "museum", "name", "net", "news", "online", "org", "page", "pro", "shop", "site", "social",
    "space", "store", "tech", "tel", "today", "travel", "website", "wiki", "world", "xyz",
];

const COUNTRY_TLDS: &str = "ac ad ae af ag ai al am ao aq ar as at au aw ax az ba bb bd be bf bg \
    bh bi bj bm bn bo br bs bt bw by bz ca cc cd cf cg ch ci ck cl cm cn co cr cu cv cw cx cy cz \
    de dj dk dm do dz ec ee eg er es et eu fi fj fk fm fo fr ga gd ge gf gg gh gi gl gm gn gp gq \
    gr gs gt gu gw gy hk hm hn hr ht hu id ie il im in io iq ir is it je jm jo jp ke kg kh ki km \
    kn kp kr kw ky kz la lb lc li lk lr ls lt lu lv ly ma mc md me mg mh mk ml mm mn mo mp mq mr \
    ms mt mu mv mw mx my mz na nc ne nf ng ni nl no np nr nu nz om pa pe pf pg ph pk pl pm pn pr \
    ps pt pw py qa re ro rs ru rw sa sb sc sd se sg sh si sk sl sm sn so sr ss st su sv sx sy sz \
    tc td tf tg th tj tk tl tm tn to tr tt tv tw tz ua ug uk us uy uz va vc ve vg vi vn vu wf ws \
    ye yt za zm zw";

static RELAXED: LazyLock<Regex> = LazyLock::new(|| {
    let tlds = GENERIC_TLDS
        .iter()
        .copied()
        .chain(COUNTRY_TLDS.split_whitespace())
        .collect::<Vec<_>>()
        .join("|");
    let host = format!(r"(?:[a-z0-9](?:[a-z0-9\-]*[a-z0-9])?\.)+(?:{tlds})\b");
    let pattern = format!(
        r#"(?i)(?:[a-z][a-z0-9+.\-]*://|mailto:)[^\s<>"]+|\b[a-z0-9._%+\-]+@{host}|\b{host}(?::[0-9]{{1,5}})?(?:/[^\s<>"]*)?"#
    );
    Regex::new(&pattern).expect("relaxed URL pattern compiles")
});

/// Every URL-like substring of `text`, in order of appearance.
///
/// Deterministic: the same text always yields the same sequence.
///
/// ```
/// use t2m_social::twitter::extract::extract_urls;
///
/// let urls = extract_urls("check this out http://example.com/a and example.org/b");
/// assert_eq!(urls, ["http://example.com/a", "example.org/b"]);
/// assert!(extract_urls("nothing to see here").is_empty());
/// ```
pub fn extract_urls(text: &str) -> Vec<String> {
    RELAXED
        .find_iter(text)
        .map(|m| trim_trailing(m.as_str()))
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// `extract_urls` with repeats removed, keeping the first occurrence.
pub fn extract_distinct_urls(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    extract_urls(text)
        .into_iter()
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

fn trim_trailing(mut s: &str) -> &str {
    loop {
        let Some(last) = s.chars().last() else {
            return s;
        };
        let drop = match last {
            '.' | ',' | ':' | ';' | '!' | '?' | '\'' | '"' | '…' => true,
            ')' => unbalanced(s, '(', ')'),
            ']' => unbalanced(s, '[', ']'),
            '}' => unbalanced(s, '{', '}'),
            _ => false,
        };
        if !drop {
            return s;
        }
        s = &s[..s.len() - last.len_utf8()];
    }
}

fn unbalanced(s: &str, open: char, close: char) -> bool {
    s.matches(close).count() > s.matches(open).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relaxed_mode_matches_with_and_without_scheme() {
        let urls = extract_urls("check this out http://example.com/a and example.org/b");
        assert_eq!(urls.len(), 2);
        assert!(urls.iter().any(|u| !u.contains("://")));
    }

    #[test]
    fn extraction_is_idempotent() {
        let text = "a https://x.io/1?q=2#f, b t.co/xyz (see en.wikipedia.org/wiki/Rust_(language)) bob@example.net";
        let first = extract_urls(text);
        let second = extract_urls(text);
        assert_eq!(first, second);
        assert_eq!(
            first,
            [
                "https://x.io/1?q=2#f",
                "t.co/xyz",
                "en.wikipedia.org/wiki/Rust_(language)",
                "bob@example.net",
            ]
        );
    }

    #[test]
    fn trailing_punctuation_is_not_part_of_the_url() {
        assert_eq!(
            extract_urls("Read https://blog.rust-lang.org/. Then (go to example.com/docs)!"),
            ["https://blog.rust-lang.org/", "example.com/docs"]
        );
    }

    #[test]
    fn ports_schemes_and_mailto() {
        assert_eq!(
            extract_urls("ftp://files.example.com/x localhost.dev:8080/health mailto:hi@example.com"),
            [
                "ftp://files.example.com/x",
                "localhost.dev:8080/health",
                "mailto:hi@example.com"
            ]
        );
    }

    #[test]
    fn ignores_things_that_only_look_like_hosts() {
        assert!(extract_urls("version 1.5 e.g. this, Node.js and foo_bar.com").is_empty());
        assert!(extract_urls("").is_empty());
    }

    #[test]
    fn case_insensitive_hosts() {
        assert_eq!(extract_urls("Visit GitHub.COM today"), ["GitHub.COM"]);
    }

    #[test]
    fn distinct_keeps_first_occurrence_order() {
        assert_eq!(
            extract_distinct_urls("example.org a.co example.org https://a.co a.co"),
            ["example.org", "a.co", "https://a.co"]
        );
    }
}
