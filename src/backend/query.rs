//! Row query description shared by every backend.
//!
//! A [`Select`] renders to PostgREST query parameters for the HTTP backend
//! and is interpreted directly by the in-memory backend.

/// Logical tables exposed by the hosted backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Table {
    Profiles,
    Events,
    EventParticipants,
}

impl Table {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::Events => "events",
            Self::EventParticipants => "event_participants",
        }
    }
}

/// Projected columns of the base table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Columns {
    All,
    List(Vec<String>),
}

/// Related table joined into each row under its table name.
///
/// `via` names the local foreign-key column. PostgREST infers the
/// relationship on its own, so only the in-memory backend reads it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Embed {
    pub table: Table,
    pub via: String,
    pub columns: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub direction: Direction,
}

/// A read against one table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Select {
    pub table: Table,
    pub columns: Columns,
    pub embed: Option<Embed>,
    /// Equality filters as `(column, value)`.
    pub filters: Vec<(String, String)>,
    pub order: Option<Order>,
    /// Exactly one row is expected; zero or many is an error.
    pub single: bool,
}

impl Select {
    /// Select every column of `table`.
    #[must_use]
    pub fn table(table: Table) -> Self {
        Self { table, columns: Columns::All, embed: None, filters: Vec::new(), order: None, single: false }
    }

    #[must_use]
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = Columns::List(columns.iter().map(|c| (*c).to_owned()).collect());
        self
    }

    #[must_use]
    pub fn embed(mut self, table: Table, via: &str, columns: &[&str]) -> Self {
        self.embed = Some(Embed {
            table,
            via: via.to_owned(),
            columns: columns.iter().map(|c| (*c).to_owned()).collect(),
        });
        self
    }

    #[must_use]
    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push((column.to_owned(), value.to_string()));
        self
    }

    #[must_use]
    pub fn order(mut self, column: &str, direction: Direction) -> Self {
        self.order = Some(Order { column: column.to_owned(), direction });
        self
    }

    #[must_use]
    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }

    /// The `select=` expression, e.g. `*,profiles(full_name,email)`.
    #[must_use]
    pub fn select_expr(&self) -> String {
        let mut expr = match &self.columns {
            Columns::All => "*".to_owned(),
            Columns::List(cols) => cols.join(","),
        };
        if let Some(embed) = &self.embed {
            expr.push(',');
            expr.push_str(embed.table.as_str());
            expr.push('(');
            expr.push_str(&embed.columns.join(","));
            expr.push(')');
        }
        expr
    }

    /// Full PostgREST query string parameters in a stable order.
    #[must_use]
    pub fn query_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_owned(), self.select_expr())];
        for (column, value) in &self.filters {
            params.push((column.clone(), format!("eq.{value}")));
        }
        if let Some(order) = &self.order {
            let dir = match order.direction {
                Direction::Ascending => "asc",
                Direction::Descending => "desc",
            };
            params.push(("order".to_owned(), format!("{}.{dir}", order.column)));
        }
        params
    }
}

#[cfg(test)]
#[path = "query_test.rs"]
mod tests;
