use std::collections::BTreeSet;
use std::fmt;
use serde::{Deserialize, Serialize};

/// Attribute ordered by when a statement names no `ORDER BY` key.
pub const DEFAULT_ORDER_KEY: &str = "url";

/// A compiled PQL query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub expression: Expression,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub order_by: Option<String>,
    pub sort_dir: SortDir,
    /// Every attribute the statement reads, plus the sort key.
    pub context_keys: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Condition(Box<Condition>),
    Operation(Operation),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub kind: ConditionKind,
    pub left: Expression,
    pub right: Expression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionKind {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub left: String,
    pub op: Operator,
    pub right: Operand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Eq,       // ==
    Ne,       // !=
    Match,    // =~
    NotMatch, // !~
}

impl Operator {
    /// `!=` and `!~` keep the complement of what the operand matches.
    pub fn is_negated(self) -> bool {
        matches!(self, Operator::Ne | Operator::NotMatch)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Match => "=~",
            Operator::NotMatch => "!~",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    Reference(String),
    Regex(RegexLiteral),
    Literal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegexLiteral {
    pub pattern: String,
    pub flags: String,
}

impl RegexLiteral {
    /// Pattern with inline flags, as handed to the regex engine.
    pub fn source(&self) -> String {
        if self.flags.is_empty() {
            self.pattern.clone()
        } else {
            format!("(?{}){}", self.flags, self.pattern)
        }
    }
}

impl Statement {
    pub fn new(expression: Expression) -> Self {
        let mut statement = Statement {
            expression,
            limit: None,
            offset: None,
            order_by: None,
            sort_dir: SortDir::Asc,
            context_keys: Vec::new(),
        };
        statement.refresh_context_keys();
        statement
    }

    pub fn order_key(&self) -> &str {
        self.order_by.as_deref().unwrap_or(DEFAULT_ORDER_KEY)
    }

    pub(crate) fn refresh_context_keys(&mut self) {
        let mut keys = BTreeSet::new();
        self.expression.collect_keys(&mut keys);
        keys.insert(self.order_key().to_string());
        self.context_keys = keys.into_iter().collect();
    }
}

impl Expression {
    pub fn and(left: Expression, right: Expression) -> Self {
        Expression::Condition(Box::new(Condition { kind: ConditionKind::And, left, right }))
    }

    pub fn or(left: Expression, right: Expression) -> Self {
        Expression::Condition(Box::new(Condition { kind: ConditionKind::Or, left, right }))
    }

    fn collect_keys(&self, keys: &mut BTreeSet<String>) {
        match self {
            Expression::Condition(c) => {
                c.left.collect_keys(keys);
                c.right.collect_keys(keys);
            }
            Expression::Operation(op) => {
                keys.insert(op.left.clone());
                if let Operand::Reference(other) = &op.right {
                    keys.insert(other.clone());
                }
            }
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)?;
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {}", limit)?;
        }
        if let Some(offset) = self.offset {
            write!(f, " OFFSET {}", offset)?;
        }
        if let Some(key) = &self.order_by {
            write!(f, " ORDER BY .{}", key)?;
        }
        if self.sort_dir == SortDir::Desc {
            write!(f, " DESC")?;
        }
        Ok(())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Condition(c) => {
                let kind = match c.kind {
                    ConditionKind::And => "AND",
                    ConditionKind::Or => "OR",
                };
                write!(f, "({} {} {})", c.left, kind, c.right)
            }
            Expression::Operation(op) => write!(f, "(.{} {} {})", op.left, op.op.symbol(), op.right),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reference(key) => write!(f, ".{}", key),
            Operand::Regex(re) => write!(f, "m/{}/{}", re.pattern.replace('/', "\\/"), re.flags),
            Operand::Literal(text) => {
                f.write_str("\"")?;
                for c in text.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        '\r' => f.write_str("\\r")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                f.write_str("\"")
            }
        }
    }
}

/// One projected attribute of a `SELECT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selecting {
    pub key: String,
    pub count: bool,
    pub random: bool,
    pub distinct: bool,
}

impl Selecting {
    pub fn plain(key: &str) -> Self {
        Selecting { key: key.to_string(), count: false, random: false, distinct: false }
    }

    /// Neither counted, randomised nor de-duplicated: one slot per match.
    pub fn is_plain(&self) -> bool {
        !self.count && !self.random && !self.distinct
    }
}

/// A compiled `SELECT`, optionally scoped by a statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub terms: Vec<Selecting>,
    pub within: Option<Statement>,
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if term.random {
                f.write_str("RANDOM ")?;
            }
            if term.count {
                f.write_str("COUNT ")?;
            }
            if term.distinct {
                f.write_str("DISTINCT ")?;
            }
            write!(f, ".{}", term.key)?;
        }
        if let Some(within) = &self.within {
            write!(f, " WITHIN {}", within)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eq(key: &str, value: &str) -> Expression {
        Expression::Operation(Operation {
            left: key.to_string(),
            op: Operator::Eq,
            right: Operand::Literal(value.to_string()),
        })
    }

    #[test]
    fn test_context_keys_include_default_order() {
        let statement = Statement::new(Expression::and(eq("type", "post"), eq("section", "blog")));
        assert_eq!(statement.context_keys, vec!["section", "type", "url"]);
    }

    #[test]
    fn test_display() {
        let mut statement = Statement::new(Expression::or(eq("type", "a\"b"), eq("type", "page")));
        statement.limit = Some(5);
        statement.order_by = Some("title".to_string());
        statement.sort_dir = SortDir::Desc;
        assert_eq!(
            statement.to_string(),
            r#"((.type == "a\"b") OR (.type == "page")) LIMIT 5 ORDER BY .title DESC"#
        );
    }

    #[test]
    fn test_regex_source_flags() {
        let re = RegexLiteral { pattern: "^a/b".to_string(), flags: "i".to_string() };
        assert_eq!(re.source(), "(?i)^a/b");
        assert_eq!(Operand::Regex(re).to_string(), r"m/^a\/b/i");
    }
}
