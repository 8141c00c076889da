//! Dialect configuration points.
//!
//! A [`Dialect`] is a plain value: the operation prefix, the identifier quote
//! character, the placeholder style and the tail-clause function. The
//! statement builders are generic and take the dialect as a parameter;
//! backends differ only in the pieces collected here.

use crate::ident::Ident;

/// Direction of one `ORDER BY` term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub column: Ident,
    pub direction: Direction,
}

/// Validated ordering and pagination of a read, handed to the tail function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub order: Vec<OrderTerm>,
    pub offset: Option<u64>,
    /// Always present: an absent `limit` node resolves to the default.
    pub limit: u64,
}

/// Appends ordering and pagination clauses after everything else is emitted.
///
/// The second argument is the dialect's identifier quote character.
pub type TailFn = fn(&Pagination, char, &mut String);

/// How parameter placeholders are spelled in statement text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1, $2, ...` (PostgreSQL)
    Dollar,
    /// `@p0, @p1, ...` (SQL Server)
    AtP,
}

/// Dialect-specific rules used by the builders and the engine.
#[derive(Debug, Clone, Copy)]
pub struct Dialect {
    /// Operation prefix, e.g. `pgsql` in `pgsql.read`.
    pub name: &'static str,
    pub quote: char,
    pub placeholder: PlaceholderStyle,
    pub tail: TailFn,
}

impl Dialect {
    /// PostgreSQL: `"ident"`, `$n`, `LIMIT n OFFSET m`.
    pub fn postgres() -> Self {
        Self {
            name: "pgsql",
            quote: '"',
            placeholder: PlaceholderStyle::Dollar,
            tail: limit_offset_tail,
        }
    }

    /// SQL Server: `"ident"`, `@pn`, `OFFSET m ROWS FETCH NEXT n ROWS ONLY`.
    pub fn mssql() -> Self {
        Self {
            name: "mssql",
            quote: '"',
            placeholder: PlaceholderStyle::AtP,
            tail: fetch_next_tail,
        }
    }

    /// Placeholder for the parameter at 0-based position `idx`.
    pub fn placeholder(&self, idx: usize) -> String {
        match self.placeholder {
            PlaceholderStyle::Dollar => format!("${}", idx + 1),
            PlaceholderStyle::AtP => format!("@p{idx}"),
        }
    }

    /// Scope name connections are registered under.
    pub fn connect_scope(&self) -> String {
        format!("{}.connect", self.name)
    }

    /// Scope name transactions are registered under.
    pub fn transaction_scope(&self) -> String {
        format!("{}.transaction", self.name)
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::postgres()
    }
}

fn write_order_by(p: &Pagination, quote: char, out: &mut String) {
    for (i, term) in p.order.iter().enumerate() {
        out.push_str(if i == 0 { " ORDER BY " } else { ", " });
        term.column.write_sql(out, quote);
        out.push(' ');
        out.push_str(term.direction.as_sql());
    }
}

/// `ORDER BY ... LIMIT n [OFFSET m]`
pub fn limit_offset_tail(p: &Pagination, quote: char, out: &mut String) {
    write_order_by(p, quote, out);
    out.push_str(" LIMIT ");
    out.push_str(&p.limit.to_string());
    if let Some(offset) = p.offset {
        out.push_str(" OFFSET ");
        out.push_str(&offset.to_string());
    }
}

/// `ORDER BY ... OFFSET m ROWS FETCH NEXT n ROWS ONLY`
///
/// T-SQL only accepts `FETCH` after `ORDER BY ... OFFSET`, so both are always
/// written: an unordered read sorts by `(SELECT NULL)` and skips 0 rows.
pub fn fetch_next_tail(p: &Pagination, quote: char, out: &mut String) {
    if p.order.is_empty() {
        out.push_str(" ORDER BY (SELECT NULL)");
    } else {
        write_order_by(p, quote, out);
    }
    out.push_str(" OFFSET ");
    out.push_str(&p.offset.unwrap_or(0).to_string());
    out.push_str(" ROWS FETCH NEXT ");
    out.push_str(&p.limit.to_string());
    out.push_str(" ROWS ONLY");
}
