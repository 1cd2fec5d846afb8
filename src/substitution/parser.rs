//! Substitution parser

use crate::{
    condition::{Selector, WILDCARD},
    error::ParseError,
    substitution::types::Substitution,
};
use lru::LruCache;
use std::{cell::RefCell, num::NonZeroUsize};

// Thread-local LRU cache for substitution parsing.
//
// Caches parsed ASTs, never resolved values: parsing is context-independent,
// resolution happens separately against the current scope.
const SUBSTITUTION_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(1024) {
    Some(size) => size,
    None => panic!("cache size must be non-zero"),
};

thread_local! {
    static PARSE_CACHE: RefCell<LruCache<String, Vec<Substitution>>> =
        RefCell::new(LruCache::new(SUBSTITUTION_CACHE_SIZE));
}

/// Parse substitution string like "$(var x)" or "text $(env Y) more"
/// Supports nested substitutions like "$(command echo $(var x))"
pub fn parse_substitutions(input: &str) -> Result<Vec<Substitution>, ParseError> {
    let cached = PARSE_CACHE.with(|cache| cache.borrow_mut().get(input).cloned());
    if let Some(cached) = cached {
        log::trace!("Substitution parse cache hit: {}", input);
        return Ok(cached);
    }

    log::trace!("Substitution parse cache miss: {}", input);
    let result = parse_substitutions_recursive(input)?;
    PARSE_CACHE.with(|cache| cache.borrow_mut().put(input.to_string(), result.clone()));
    Ok(result)
}

/// Internal recursive parser that handles nested substitutions
fn parse_substitutions_recursive(input: &str) -> Result<Vec<Substitution>, ParseError> {
    let mut result = Vec::new();
    let mut chars = input.char_indices().peekable();
    let mut last_pos = 0;

    while let Some((i, ch)) = chars.next() {
        if ch != '$' || !matches!(chars.peek(), Some((_, '('))) {
            continue;
        }

        if i > last_pos {
            result.push(Substitution::Text(input[last_pos..i].to_string()));
        }

        // Skip the '('
        chars.next();

        // Find matching ')' by counting parentheses
        let sub_start = i + 2;
        let mut depth = 1;
        let mut sub_end = sub_start;
        for (pos, c) in chars.by_ref() {
            if c == '(' {
                depth += 1;
            } else if c == ')' {
                depth -= 1;
                if depth == 0 {
                    sub_end = pos;
                    break;
                }
            }
        }

        if depth != 0 {
            return Err(ParseError::InvalidSubstitution(format!(
                "Unmatched parentheses in substitution: {}",
                input
            )));
        }

        result.push(parse_substitution_content(&input[sub_start..sub_end])?);
        last_pos = sub_end + 1;
    }

    if last_pos < input.len() {
        result.push(Substitution::Text(input[last_pos..].to_string()));
    }

    // If no substitutions found, treat entire input as text
    if result.is_empty() {
        result.push(Substitution::Text(input.to_string()));
    }

    Ok(result)
}

/// Parse the content inside a substitution $(...)
fn parse_substitution_content(content: &str) -> Result<Substitution, ParseError> {
    let trimmed = content.trim();
    let (sub_type, args) = match trimmed.split_once(char::is_whitespace) {
        Some((sub_type, args)) => (sub_type, Some(args.trim())),
        None => (trimmed, None),
    };

    if sub_type.is_empty() {
        return Err(ParseError::InvalidSubstitution(
            "Empty substitution".to_string(),
        ));
    }

    match sub_type {
        "var" => {
            let name = required(sub_type, args)?;
            if name.contains("$(") || name.contains(char::is_whitespace) {
                return Err(ParseError::InvalidSubstitution(format!(
                    "var expects a plain argument name, got '{}'",
                    name
                )));
            }
            Ok(Substitution::Argument(name.to_string()))
        }
        "env" => {
            let words = split_arguments(required(sub_type, args)?)?;
            let (name, rest) = words.split_first().ok_or_else(|| {
                ParseError::InvalidSubstitution("env requires a variable name".to_string())
            })?;
            let default = if rest.is_empty() {
                None
            } else {
                Some(parse_word(&rest.join(" "))?)
            };
            Ok(Substitution::Env {
                name: strip_quotes(name).to_string(),
                default,
            })
        }
        "command" => {
            let command = strip_quotes(required(sub_type, args)?);
            Ok(Substitution::Command(parse_substitutions_recursive(command)?))
        }
        "find-pkg-share" => {
            let package = strip_quotes(required(sub_type, args)?);
            Ok(Substitution::FindPackageShare(parse_substitutions_recursive(
                package,
            )?))
        }
        "path-join" => {
            let parts = split_arguments(required(sub_type, args)?)?
                .iter()
                .map(|word| parse_word(word).map(Substitution::from_parts))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Substitution::PathJoin(parts))
        }
        "select" => parse_select(required(sub_type, args)?),
        _ => Err(ParseError::InvalidSubstitution(format!(
            "Unknown substitution type: {}",
            sub_type
        ))),
    }
}

fn required<'a>(sub_type: &str, args: Option<&'a str>) -> Result<&'a str, ParseError> {
    args.filter(|a| !a.is_empty()).ok_or_else(|| {
        ParseError::InvalidSubstitution(format!("{} requires an argument", sub_type))
    })
}

/// `$(select COND KEY=VALUE ... [*=DEFAULT])`
fn parse_select(args: &str) -> Result<Substitution, ParseError> {
    let words = split_arguments(args)?;
    let (condition, cases) = words.split_first().ok_or_else(|| {
        ParseError::InvalidSubstitution("select requires a condition".to_string())
    })?;
    if cases.is_empty() {
        return Err(ParseError::InvalidSubstitution(
            "select requires at least one KEY=VALUE case".to_string(),
        ));
    }

    let mut selector = Selector::new(Substitution::from_parts(parse_word(condition)?));
    for case in cases {
        let (key, value) = split_case(case).ok_or_else(|| {
            ParseError::InvalidSubstitution(format!("select case '{}' is not KEY=VALUE", case))
        })?;
        let value = Substitution::from_parts(parse_word(value)?);
        selector = if key == WILDCARD {
            selector.otherwise(value)
        } else {
            selector.case(strip_quotes(key), value)
        };
    }
    Ok(Substitution::select(selector))
}

/// Split `key=value` at the first '=' that is not inside a nested `$(...)`.
fn split_case(word: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (i, ch) in word.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '=' if depth == 0 => return Some((&word[..i], &word[i + 1..])),
            _ => {}
        }
    }
    None
}

/// Parse one argument word: quotes are stripped, nested substitutions kept.
fn parse_word(word: &str) -> Result<Vec<Substitution>, ParseError> {
    let inner = strip_quotes(word);
    if inner.is_empty() {
        return Ok(vec![Substitution::Text(String::new())]);
    }
    parse_substitutions_recursive(inner)
}

/// Split substitution arguments on whitespace, keeping quoted strings and
/// nested `$(...)` together.
pub(crate) fn split_arguments(args: &str) -> Result<Vec<&str>, ParseError> {
    let mut words = Vec::new();
    let mut start: Option<usize> = None;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for (i, ch) in args.char_indices() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => {
                quote = Some(ch);
                start.get_or_insert(i);
            }
            '(' => {
                depth += 1;
                start.get_or_insert(i);
            }
            ')' => {
                depth = depth.saturating_sub(1);
            }
            c if c.is_whitespace() && depth == 0 => {
                if let Some(s) = start.take() {
                    words.push(&args[s..i]);
                }
            }
            _ => {
                start.get_or_insert(i);
            }
        }
    }

    if quote.is_some() {
        return Err(ParseError::InvalidSubstitution(format!(
            "Unterminated quote in: {}",
            args
        )));
    }
    if let Some(s) = start {
        words.push(&args[s..]);
    }
    Ok(words)
}

/// Parse a whitespace separated argument list, one expression per word.
pub(crate) fn parse_word_list(input: &str) -> Result<Vec<Vec<Substitution>>, ParseError> {
    split_arguments(input)?.into_iter().map(parse_word).collect()
}

/// Strip one layer of matching surrounding quotes.
fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2
        && ((s.starts_with('\'') && s.ends_with('\'')) || (s.starts_with('"') && s.ends_with('"')))
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_text() {
        let subs = parse_substitutions("hello world").unwrap();
        assert_eq!(subs, vec![Substitution::Text("hello world".to_string())]);
    }

    #[test]
    fn test_parse_var_substitution() {
        let subs = parse_substitutions("$(var rname)").unwrap();
        assert_eq!(subs, vec![Substitution::Argument("rname".to_string())]);
    }

    #[test]
    fn test_parse_var_rejects_nested_name() {
        assert!(parse_substitutions("$(var $(var a)_b)").is_err());
    }

    #[test]
    fn test_parse_env_substitution() {
        let subs = parse_substitutions("$(env HOME)").unwrap();
        assert_eq!(
            subs,
            vec![Substitution::Env {
                name: "HOME".to_string(),
                default: None
            }]
        );
    }

    #[test]
    fn test_parse_env_with_empty_quoted_default() {
        let subs = parse_substitutions("$(env ROS_DISTRO '')").unwrap();
        assert_eq!(
            subs,
            vec![Substitution::Env {
                name: "ROS_DISTRO".to_string(),
                default: Some(vec![Substitution::Text(String::new())]),
            }]
        );
    }

    #[test]
    fn test_parse_env_with_nested_default() {
        let subs = parse_substitutions("$(env MY_VAR $(var fallback))").unwrap();
        assert_eq!(
            subs,
            vec![Substitution::Env {
                name: "MY_VAR".to_string(),
                default: Some(vec![Substitution::Argument("fallback".to_string())]),
            }]
        );
    }

    #[test]
    fn test_parse_mixed() {
        let subs = parse_substitutions("/$(var rname)_gazebo").unwrap();
        assert_eq!(
            subs,
            vec![
                Substitution::Text("/".to_string()),
                Substitution::Argument("rname".to_string()),
                Substitution::Text("_gazebo".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_command_keeps_spacing() {
        let subs = parse_substitutions("$(command xacro $(var path)/robot.xacro)").unwrap();
        assert_eq!(
            subs,
            vec![Substitution::Command(vec![
                Substitution::Text("xacro ".to_string()),
                Substitution::Argument("path".to_string()),
                Substitution::Text("/robot.xacro".to_string()),
            ])]
        );
    }

    #[test]
    fn test_parse_nested_command() {
        let input = "$(command echo -n $(command ros2 pkg prefix $(var rname)_description))";
        let subs = parse_substitutions(input).unwrap();
        let Substitution::Command(outer) = &subs[0] else {
            panic!("Expected Command");
        };
        assert_eq!(outer[0], Substitution::Text("echo -n ".to_string()));
        assert!(matches!(outer[1], Substitution::Command(_)));
    }

    #[test]
    fn test_parse_path_join() {
        let input =
            "$(path-join $(find-pkg-share $(var rname)_description) launch display.launch.xml)";
        let subs = parse_substitutions(input).unwrap();
        let Substitution::PathJoin(parts) = &subs[0] else {
            panic!("Expected PathJoin");
        };
        assert_eq!(parts.len(), 3);
        assert!(matches!(parts[0], Substitution::FindPackageShare(_)));
        assert_eq!(parts[1], Substitution::Text("launch".to_string()));
        assert_eq!(parts[2], Substitution::Text("display.launch.xml".to_string()));
    }

    #[test]
    fn test_parse_select() {
        let input = "$(select $(env ROS_DISTRO '') foxy=spawner.py *=spawner)";
        let subs = parse_substitutions(input).unwrap();
        let Substitution::Select(selector) = &subs[0] else {
            panic!("Expected Select");
        };
        assert!(matches!(selector.condition, Substitution::Env { .. }));
        assert_eq!(
            selector.cases,
            vec![("foxy".to_string(), Substitution::Text("spawner.py".to_string()))]
        );
        assert_eq!(
            selector.default,
            Some(Substitution::Text("spawner".to_string()))
        );
        assert_eq!(
            selector.select_value("foxy").unwrap(),
            &Substitution::Text("spawner.py".to_string())
        );
        assert_eq!(
            selector.select_value("humble").unwrap(),
            &Substitution::Text("spawner".to_string())
        );
    }

    #[test]
    fn test_parse_select_rejects_bad_case() {
        assert!(parse_substitutions("$(select $(var x) foxy)").is_err());
        assert!(parse_substitutions("$(select $(var x))").is_err());
    }

    #[test]
    fn test_unmatched_parenthesis() {
        assert!(parse_substitutions("$(var x").is_err());
    }

    #[test]
    fn test_unknown_substitution() {
        let err = parse_substitutions("$(eval 1 + 1)").unwrap_err();
        assert!(err.to_string().contains("Unknown substitution type"));
    }

    #[test]
    fn test_split_arguments() {
        assert_eq!(
            split_arguments("-topic /robot_description  -entity 'robot model'").unwrap(),
            vec!["-topic", "/robot_description", "-entity", "'robot model'"]
        );
        assert_eq!(
            split_arguments("$(var a) $(command echo x y)").unwrap(),
            vec!["$(var a)", "$(command echo x y)"]
        );
    }

    #[test]
    fn test_parse_word_list() {
        let words = parse_word_list("-entity 'robot model' -x $(var x_pos)").unwrap();
        assert_eq!(words.len(), 4);
        assert_eq!(words[1], vec![Substitution::Text("robot model".to_string())]);
        assert_eq!(words[3], vec![Substitution::Argument("x_pos".to_string())]);
        assert!(parse_word_list("  ").unwrap().is_empty());
    }

    #[test]
    fn test_cache_returns_same_ast() {
        let first = parse_substitutions("$(var cached_name)").unwrap();
        let second = parse_substitutions("$(var cached_name)").unwrap();
        assert_eq!(first, second);
    }
}
