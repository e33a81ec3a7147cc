//! A database of named run parameters, read from an input file and then
//! overridden from the command line.
//!
//! The syntax is a sequence of definitions `name = v1 v2 ...`, separated by
//! whitespace (several may share a line), with `#` comments. A definition
//! ends where the next `name =` begins. On the command line a bare
//! `-name` defines a flag with no values. When a name is defined more than
//! once, the last definition wins, which is how command-line arguments
//! override the file.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::Error;

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Equals,
}

#[derive(Clone, Debug)]
struct Definition {
    name: String,
    values: Vec<String>,
}

/// A shared, immutable view of the parameter table, optionally scoped to a
/// name prefix such as `amr`. Cloning is cheap.
///
#[derive(Clone, Debug, Default)]
pub struct ParmParse {
    entries: Arc<Vec<Definition>>,
    prefix: Option<String>,
}

impl ParmParse {
    /// Parse a parameter table from text in input-file syntax.
    ///
    pub fn parse(text: &str) -> Result<Self, Error> {
        Ok(Self {
            entries: Arc::new(definitions(tokenize(text)?)?),
            prefix: None,
        })
    }

    /// Read the input file, then apply the command-line arguments that
    /// follow it. Each argument is one or more tokens; `name=value` glued
    /// together is accepted as well as `name = value`.
    ///
    pub fn from_file_and_args<P: AsRef<Path>>(path: P, args: &[String]) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut tokens = tokenize(&text)?;

        for arg in args {
            tokens.extend(tokenize(arg)?);
        }
        Ok(Self {
            entries: Arc::new(definitions(tokens)?),
            prefix: None,
        })
    }

    /// Return a view which prepends `prefix.` to every queried name.
    ///
    pub fn with_prefix(&self, prefix: &str) -> Self {
        Self {
            entries: self.entries.clone(),
            prefix: Some(prefix.to_string()),
        }
    }

    /// Determine whether the name is defined, with or without values.
    ///
    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Return the first value of the last definition of `name`, parsed as
    /// `T`. Undefined names (and flags with no values) yield `Ok(None)`.
    ///
    pub fn query<T: FromStr>(&self, name: &str) -> Result<Option<T>, Error> {
        match self.lookup(name).and_then(|d| d.values.first().map(|v| (d, v))) {
            None => Ok(None),
            Some((d, v)) => v.parse().map(Some).map_err(|_| Error::BadParameter {
                name: d.name.clone(),
                value: v.clone(),
            }),
        }
    }

    /// Like `query`, but fall back to `default` when the name is undefined.
    ///
    pub fn query_or<T: FromStr>(&self, name: &str, default: T) -> Result<T, Error> {
        Ok(self.query(name)?.unwrap_or(default))
    }

    /// Return every value of the last definition of `name`, parsed as `T`.
    ///
    pub fn query_all<T: FromStr>(&self, name: &str) -> Result<Option<Vec<T>>, Error> {
        match self.lookup(name) {
            None => Ok(None),
            Some(d) => d
                .values
                .iter()
                .map(|v| {
                    v.parse().map_err(|_| Error::BadParameter {
                        name: d.name.clone(),
                        value: v.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
        }
    }

    fn lookup(&self, name: &str) -> Option<&Definition> {
        let full_name = match &self.prefix {
            Some(prefix) => format!("{}.{}", prefix, name),
            None => name.to_string(),
        };
        self.entries.iter().rev().find(|d| d.name == full_name)
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut chars = text.chars();

    fn flush(word: &mut String, tokens: &mut Vec<Token>) {
        if !word.is_empty() {
            tokens.push(Token::Word(std::mem::take(word)))
        }
    }

    while let Some(c) = chars.next() {
        match c {
            '#' => {
                flush(&mut word, &mut tokens);
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '=' => {
                flush(&mut word, &mut tokens);
                tokens.push(Token::Equals);
            }
            '"' => {
                flush(&mut word, &mut tokens);
                let mut quoted = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some(c) => quoted.push(c),
                        None => return Err(Error::Usage(format!("unterminated quoted string \"{}", quoted))),
                    }
                }
                tokens.push(Token::Quoted(quoted));
            }
            c if c.is_whitespace() => flush(&mut word, &mut tokens),
            c => word.push(c),
        }
    }
    flush(&mut word, &mut tokens);
    Ok(tokens)
}

/// A `-name` word names a flag; `-1` or `-.5` is a negative number.
///
fn flag_name(word: &str) -> Option<&str> {
    let rest = word.strip_prefix('-')?;
    match rest.chars().next() {
        Some(c) if c.is_alphabetic() || c == '_' => Some(rest),
        _ => None,
    }
}

fn definitions(tokens: Vec<Token>) -> Result<Vec<Definition>, Error> {
    let mut result = Vec::new();
    let mut i = 0;

    let starts_definition = |i: usize| -> bool {
        match (tokens.get(i), tokens.get(i + 1)) {
            (Some(Token::Word(_)), Some(Token::Equals)) => true,
            (Some(Token::Word(w)), _) => flag_name(w).is_some(),
            _ => false,
        }
    };

    while i < tokens.len() {
        match (&tokens[i], tokens.get(i + 1)) {
            (Token::Word(name), Some(Token::Equals)) => {
                let name = name.clone();
                let mut values = Vec::new();
                i += 2;

                while i < tokens.len() && !starts_definition(i) {
                    match &tokens[i] {
                        Token::Word(v) | Token::Quoted(v) => values.push(v.clone()),
                        Token::Equals => return Err(Error::Usage(format!("misplaced '=' in definition of {}", name))),
                    }
                    i += 1;
                }
                result.push(Definition { name, values });
            }
            (Token::Word(word), _) if flag_name(word).is_some() => {
                let name = flag_name(word).unwrap_or_default().to_string();
                result.push(Definition { name, values: Vec::new() });
                i += 1;
            }
            (Token::Word(word), _) | (Token::Quoted(word), _) => {
                return Err(Error::Usage(format!("expected '=' after {}", word)))
            }
            (Token::Equals, _) => return Err(Error::Usage("'=' without a parameter name".to_string())),
        }
    }
    Ok(result)
}

#[cfg(test)]
mod test {
    use super::ParmParse;
    use crate::error::Error;
    use std::io::Write;

    #[test]
    fn parses_definitions_and_comments() {
        let pp = ParmParse::parse(
            "# run control\n\
             max_step = 10   stop_time=2.5 # trailing comment\n\
             amr.n_cell = 32 32\n\
             amr.plot_file = \"plt run\"\n",
        )
        .unwrap();

        assert_eq!(pp.query::<i64>("max_step").unwrap(), Some(10));
        assert_eq!(pp.query::<f64>("stop_time").unwrap(), Some(2.5));
        assert_eq!(pp.query_all::<i64>("amr.n_cell").unwrap(), Some(vec![32, 32]));
        assert_eq!(pp.with_prefix("amr").query::<String>("plot_file").unwrap(), Some("plt run".to_string()));
        assert_eq!(pp.query::<f64>("strt_time").unwrap(), None);
    }

    #[test]
    fn negative_values_are_not_flags() {
        let pp = ParmParse::parse("max_step = -1 stop_time = -1.0 -amr.print_tags v = -.5").unwrap();
        assert_eq!(pp.query::<i64>("max_step").unwrap(), Some(-1));
        assert_eq!(pp.query::<f64>("stop_time").unwrap(), Some(-1.0));
        assert!(pp.contains("amr.print_tags"));
        assert_eq!(pp.query::<f64>("v").unwrap(), Some(-0.5));
    }

    #[test]
    fn later_definitions_win() {
        let pp = ParmParse::parse("max_step = 10\nmax_step = 20").unwrap();
        assert_eq!(pp.query_or("max_step", -1).unwrap(), 20);
    }

    #[test]
    fn command_line_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_step = 10\nstop_time = 1.0").unwrap();

        let args: Vec<String> = vec!["max_step".into(), "=".into(), "3".into(), "-amr.print_tags".into(), "sleep=2".into()];
        let pp = ParmParse::from_file_and_args(file.path(), &args).unwrap();

        assert_eq!(pp.query::<i64>("max_step").unwrap(), Some(3));
        assert_eq!(pp.query::<f64>("stop_time").unwrap(), Some(1.0));
        assert_eq!(pp.query::<i64>("sleep").unwrap(), Some(2));
        assert!(pp.with_prefix("amr").contains("print_tags"));
    }

    #[test]
    fn unparseable_value_is_an_error() {
        let pp = ParmParse::parse("max_step = ten").unwrap();
        match pp.query::<i64>("max_step") {
            Err(Error::BadParameter { name, value }) => {
                assert_eq!(name, "max_step");
                assert_eq!(value, "ten");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn dangling_name_is_an_error() {
        assert!(ParmParse::parse("max_step 10").is_err());
        assert!(ParmParse::parse("= 10").is_err());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        match ParmParse::from_file_and_args("/nonexistent/inputs", &[]) {
            Err(Error::Io { path, .. }) => assert_eq!(path.to_str(), Some("/nonexistent/inputs")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
