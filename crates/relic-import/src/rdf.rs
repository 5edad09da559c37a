//! Minimal RDF terms, N-Triples encoding and SPARQL Update bodies
//!
//! Only what the repository client and the domain object need: reading a
//! resource's statements, writing new resources, and patching changes.

use std::fmt;

pub mod vocab {
    pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
    pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

    pub const DCTERMS_TITLE: &str = "http://purl.org/dc/terms/title";
    pub const DCTERMS_IDENTIFIER: &str = "http://purl.org/dc/terms/identifier";
    pub const DCTERMS_FORMAT: &str = "http://purl.org/dc/terms/format";

    pub const PCDM_OBJECT: &str = "http://pcdm.org/models#Object";
    pub const PCDM_FILE: &str = "http://pcdm.org/models#File";
    pub const PCDM_MEMBER_OF: &str = "http://pcdm.org/models#memberOf";
    pub const PCDM_HAS_MEMBER: &str = "http://pcdm.org/models#hasMember";
    pub const PCDM_HAS_FILE: &str = "http://pcdm.org/models#hasFile";
    pub const PCDM_FILE_OF: &str = "http://pcdm.org/models#fileOf";
    pub const PCDM_USE_PRESERVATION_MASTER: &str = "http://pcdm.org/use#PreservationMasterFile";

    pub const FABIO_PAGE: &str = "http://purl.org/spar/fabio/Page";
    pub const FABIO_SEQUENCE_NUMBER: &str = "http://purl.org/spar/fabio/hasSequenceIdentifier";

    pub const OA_ANNOTATION: &str = "http://www.w3.org/ns/oa#Annotation";
    pub const OA_HAS_TARGET: &str = "http://www.w3.org/ns/oa#hasTarget";
    pub const OA_BODY_VALUE: &str = "http://www.w3.org/ns/oa#bodyValue";
    pub const OA_MOTIVATED_BY: &str = "http://www.w3.org/ns/oa#motivatedBy";
    pub const OA_TRANSCRIBING: &str = "http://www.w3.org/ns/oa#transcribing";
    pub const UMD_FULL_TEXT_ANNOTATION: &str = "http://vocab.lib.umd.edu/model#FullTextAnnotation";

    pub const UMDACCESS_PUBLISHED: &str = "http://vocab.lib.umd.edu/access#Published";
    pub const UMDACCESS_HIDDEN: &str = "http://vocab.lib.umd.edu/access#Hidden";
}

/// An RDF node in object position
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    Iri(String),
    Literal {
        value: String,
        lang: Option<String>,
        datatype: Option<String>,
    },
    Blank(String),
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(iri.into())
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            lang: None,
            datatype: None,
        }
    }

    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            lang: None,
            datatype: Some(datatype.into()),
        }
    }

    /// Lexical value of a literal, or the IRI itself
    pub fn value(&self) -> &str {
        match self {
            Term::Iri(iri) => iri,
            Term::Literal { value, .. } => value,
            Term::Blank(id) => id,
        }
    }

    /// N-Triples form; `<>` when the IRI is empty (the resource being created)
    pub fn to_ntriples(&self) -> String {
        match self {
            Term::Iri(iri) => format!("<{}>", escape_iri(iri)),
            Term::Blank(id) => format!("_:{id}"),
            Term::Literal {
                value,
                lang,
                datatype,
            } => {
                let mut out = format!("\"{}\"", escape_literal(value));
                if let Some(lang) = lang {
                    out.push('@');
                    out.push_str(lang);
                } else if let Some(datatype) = datatype.as_deref().filter(|dt| *dt != vocab::XSD_STRING) {
                    out.push_str("^^<");
                    out.push_str(datatype);
                    out.push('>');
                }
                out
            },
        }
    }

    /// Literal equality ignoring an explicit `xsd:string` datatype
    fn normalized(&self) -> Term {
        match self {
            Term::Literal {
                value,
                lang,
                datatype,
            } if datatype.as_deref() == Some(vocab::XSD_STRING) => Term::Literal {
                value: value.clone(),
                lang: lang.clone(),
                datatype: None,
            },
            other => other.clone(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ntriples())
    }
}

/// A single statement
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: impl Into<String>, predicate: impl Into<String>, object: Term) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.normalized(),
        }
    }

    pub fn to_ntriples(&self) -> String {
        format!(
            "{} <{}> {} .",
            Term::Iri(self.subject.clone()).to_ntriples(),
            escape_iri(&self.predicate),
            self.object.to_ntriples()
        )
    }
}

/// Predicate/object pairs describing one resource.
///
/// An empty subject stands for the resource a request is creating.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Description {
    pub subject: String,
    pub statements: Vec<(String, Term)>,
}

impl Description {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            statements: Vec::new(),
        }
    }

    pub fn add(&mut self, predicate: impl Into<String>, object: Term) -> &mut Self {
        let predicate = predicate.into();
        let object = object.normalized();
        if !self.statements.iter().any(|(p, o)| *p == predicate && *o == object) {
            self.statements.push((predicate, object));
        }
        self
    }

    pub fn add_type(&mut self, iri: impl Into<String>) -> &mut Self {
        self.add(vocab::RDF_TYPE, Term::Iri(iri.into()))
    }

    pub fn values<'a>(&'a self, predicate: &'a str) -> impl Iterator<Item = &'a Term> + 'a {
        self.statements
            .iter()
            .filter(move |(p, _)| p == predicate)
            .map(|(_, o)| o)
    }

    pub fn has_type(&self, iri: &str) -> bool {
        self.values(vocab::RDF_TYPE).any(|t| t.value() == iri)
    }

    pub fn triples(&self) -> Vec<Triple> {
        self.statements
            .iter()
            .map(|(p, o)| Triple::new(self.subject.clone(), p.clone(), o.clone()))
            .collect()
    }

    /// Collect the statements about `subject` from a parsed graph
    pub fn from_triples(subject: &str, triples: &[Triple]) -> Self {
        let mut description = Description::new(subject);
        for triple in triples.iter().filter(|t| t.subject == subject) {
            description.add(triple.predicate.clone(), triple.object.clone());
        }
        description
    }

    /// N-Triples document for this description
    pub fn to_ntriples(&self) -> String {
        let mut out = String::new();
        for triple in self.triples() {
            out.push_str(&triple.to_ntriples());
            out.push('\n');
        }
        out
    }
}

/// Statements to remove and add on an existing resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    pub deletes: Vec<Triple>,
    pub inserts: Vec<Triple>,
}

impl Changeset {
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.inserts.is_empty()
    }

    pub fn insert(&mut self, triple: Triple) {
        self.inserts.push(triple);
    }

    /// SPARQL 1.1 Update request body
    pub fn to_sparql_update(&self) -> String {
        let mut parts = Vec::new();
        if !self.deletes.is_empty() {
            parts.push(format!("DELETE DATA {{\n{}}}", block(&self.deletes)));
        }
        if !self.inserts.is_empty() {
            parts.push(format!("INSERT DATA {{\n{}}}", block(&self.inserts)));
        }
        parts.join(" ;\n")
    }
}

fn block(triples: &[Triple]) -> String {
    triples
        .iter()
        .map(|t| format!("  {}\n", t.to_ntriples()))
        .collect()
}

fn escape_iri(iri: &str) -> String {
    iri.replace('>', "%3E").replace('<', "%3C").replace(' ', "%20")
}

fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

/// Error from [`parse_ntriples`], with a 1-based line number
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct NTriplesError {
    pub line: usize,
    pub message: String,
}

/// Parse an N-Triples document
pub fn parse_ntriples(text: &str) -> Result<Vec<Triple>, NTriplesError> {
    let mut triples = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fail = |message: &str| NTriplesError {
            line: index + 1,
            message: message.to_string(),
        };

        let mut cursor = Cursor::new(line);
        let subject = match cursor.term().map_err(|m| fail(&m))? {
            Term::Iri(iri) => iri,
            Term::Blank(id) => format!("_:{id}"),
            Term::Literal { .. } => return Err(fail("literal in subject position")),
        };
        let predicate = match cursor.term().map_err(|m| fail(&m))? {
            Term::Iri(iri) => iri,
            _ => return Err(fail("predicate must be an IRI")),
        };
        let object = cursor.term().map_err(|m| fail(&m))?;
        cursor.skip_ws();
        if !cursor.eat('.') {
            return Err(fail("expected '.'"));
        }
        triples.push(Triple::new(subject, predicate, object));
    }
    Ok(triples)
}

struct Cursor<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Cursor<'a> {
    fn new(line: &'a str) -> Self {
        Self {
            chars: line.chars().peekable(),
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn take_until(&mut self, stop: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(&c) = self.chars.peek() {
            if stop(c) {
                break;
            }
            out.push(c);
            self.chars.next();
        }
        out
    }

    fn term(&mut self) -> Result<Term, String> {
        self.skip_ws();
        match self.chars.next() {
            Some('<') => {
                let iri = self.take_until(|c| c == '>');
                if !self.eat('>') {
                    return Err("unterminated IRI".into());
                }
                Ok(Term::Iri(iri))
            },
            Some('_') => {
                if !self.eat(':') {
                    return Err("malformed blank node".into());
                }
                Ok(Term::Blank(self.take_until(|c| c.is_whitespace() || c == '.')))
            },
            Some('"') => self.literal(),
            Some(c) => Err(format!("unexpected character '{c}'")),
            None => Err("unexpected end of line".into()),
        }
    }

    fn literal(&mut self) -> Result<Term, String> {
        let mut value = String::new();
        loop {
            match self.chars.next() {
                Some('"') => break,
                Some('\\') => match self.chars.next() {
                    Some('n') => value.push('\n'),
                    Some('r') => value.push('\r'),
                    Some('t') => value.push('\t'),
                    Some('"') => value.push('"'),
                    Some('\\') => value.push('\\'),
                    Some('u') => value.push(self.unicode_escape(4)?),
                    Some('U') => value.push(self.unicode_escape(8)?),
                    _ => return Err("invalid escape in literal".into()),
                },
                Some(c) => value.push(c),
                None => return Err("unterminated literal".into()),
            }
        }

        let mut lang = None;
        let mut datatype = None;
        if self.eat('@') {
            lang = Some(self.take_until(|c| c.is_whitespace() || c == '.'));
        } else if self.eat('^') {
            if !self.eat('^') || !self.eat('<') {
                return Err("malformed datatype".into());
            }
            datatype = Some(self.take_until(|c| c == '>'));
            if !self.eat('>') {
                return Err("unterminated datatype IRI".into());
            }
        }
        Ok(Term::Literal {
            value,
            lang,
            datatype,
        })
    }

    fn unicode_escape(&mut self, digits: usize) -> Result<char, String> {
        let hex: String = (0..digits).filter_map(|_| self.chars.next()).collect();
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| format!("invalid unicode escape \\u{hex}"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ntriples() {
        let doc = r#"
# comment
<http://example.com/1> <http://purl.org/dc/terms/title> "Moonlight \"Sonata\""@en .
<http://example.com/1> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://pcdm.org/models#Object> .
<http://example.com/1> <http://purl.org/dc/terms/date> "1801"^^<http://www.w3.org/2001/XMLSchema#gYear> .
<http://example.com/1> <http://purl.org/dc/terms/identifier> "id-1"^^<http://www.w3.org/2001/XMLSchema#string> .
"#;
        let triples = parse_ntriples(doc).unwrap();
        assert_eq!(triples.len(), 4);
        assert_eq!(
            triples[0].object,
            Term::Literal {
                value: "Moonlight \"Sonata\"".into(),
                lang: Some("en".into()),
                datatype: None
            }
        );
        assert_eq!(triples[1].object, Term::iri(vocab::PCDM_OBJECT));
        assert_eq!(
            triples[2].object,
            Term::typed("1801", "http://www.w3.org/2001/XMLSchema#gYear")
        );
        // explicit xsd:string is the same as a plain literal
        assert_eq!(triples[3].object, Term::literal("id-1"));
    }

    #[test]
    fn test_parse_ntriples_reports_line() {
        let err = parse_ntriples("<a> <b> <c> .\n<a> <b> \"open\n").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_description_serializes_relative_subject() {
        let mut description = Description::new("");
        description
            .add_type(vocab::PCDM_OBJECT)
            .add(vocab::DCTERMS_TITLE, Term::literal("Line one\nline two"));
        let body = description.to_ntriples();
        assert!(body.contains("<> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://pcdm.org/models#Object> ."));
        assert!(body.contains("\"Line one\\nline two\""));
    }

    #[test]
    fn test_description_ignores_duplicate_statements() {
        let mut description = Description::new("http://example.com/1");
        description.add_type(vocab::PCDM_OBJECT).add_type(vocab::PCDM_OBJECT);
        assert_eq!(description.statements.len(), 1);
        assert!(description.has_type(vocab::PCDM_OBJECT));
    }

    #[test]
    fn test_sparql_update() {
        let mut changeset = Changeset::default();
        assert!(changeset.is_empty());
        changeset.deletes.push(Triple::new("http://x/1", vocab::DCTERMS_TITLE, Term::literal("Old")));
        changeset.insert(Triple::new("http://x/1", vocab::DCTERMS_TITLE, Term::literal("New")));
        let update = changeset.to_sparql_update();
        assert!(update.starts_with("DELETE DATA {"));
        assert!(update.contains("\"Old\""));
        assert!(update.contains(" ;\nINSERT DATA {"));
        assert!(update.contains("\"New\""));
    }
}
