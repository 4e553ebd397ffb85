//! Table definition and builder.

use super::column::Column;
use super::constraint::{CheckConstraint, Constraints, ForeignKey, KeyConstraint};
use crate::error::{Error, Result};
use crate::types::DataType;
use crate::value::Value;

/// A table definition in the database schema.
#[derive(Clone, Debug)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    constraints: Constraints,
}

impl Table {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[inline]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    /// Resolves column names to positions.
    pub fn column_indices<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>> {
        names
            .iter()
            .map(|n| {
                self.get_column_index(n.as_ref())
                    .ok_or_else(|| Error::column_not_found(&self.name, n.as_ref()))
            })
            .collect()
    }

    pub fn primary_key(&self) -> Option<&KeyConstraint> {
        self.constraints.get_primary_key()
    }

    /// Returns a copy of this definition with its constraints replaced.
    pub fn with_constraints(&self, constraints: Constraints) -> Table {
        Table {
            name: self.name.clone(),
            columns: self.columns.clone(),
            constraints,
        }
    }
}

/// Builder for creating table definitions.
pub struct TableBuilder {
    name: String,
    columns: Vec<Column>,
    primary_key: Option<KeyConstraint>,
    unique: Vec<KeyConstraint>,
    foreign_keys: Vec<ForeignKey>,
    checks: Vec<CheckConstraint>,
}

impl TableBuilder {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        check_naming_rules(&name)?;
        Ok(Self {
            name,
            columns: Vec::new(),
            primary_key: None,
            unique: Vec::new(),
            foreign_keys: Vec::new(),
            checks: Vec::new(),
        })
    }

    pub fn add_column(mut self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        let name = name.into();
        check_naming_rules(&name)?;
        if self.has_column(&name) {
            return Err(Error::invalid_schema(format!("Column already exists: {}", name)));
        }
        self.columns.push(Column::new(name, data_type));
        Ok(self)
    }

    /// Marks columns as nullable. Unknown names are ignored.
    pub fn add_nullable(mut self, columns: &[&str]) -> Self {
        for col in self.columns.iter_mut().filter(|c| columns.contains(&c.name())) {
            *col = col.clone().nullable(true);
        }
        self
    }

    pub fn add_default(mut self, column: &str, value: Value) -> Result<Self> {
        let col = self
            .columns
            .iter_mut()
            .find(|c| c.name() == column)
            .ok_or_else(|| Error::invalid_schema(format!("Column not found: {}", column)))?;
        *col = col.clone().default_value(value);
        Ok(self)
    }

    /// Sets the primary key, named `pk_<table>`.
    pub fn add_primary_key(self, columns: &[&str]) -> Result<Self> {
        let key = KeyConstraint::new(format!("pk_{}", self.name), columns);
        self.add_primary_key_constraint(key)
    }

    pub fn add_primary_key_constraint(mut self, key: KeyConstraint) -> Result<Self> {
        if self.primary_key.is_some() {
            return Err(Error::invalid_schema(format!(
                "Table {} already has a primary key",
                self.name
            )));
        }
        self.check_key(&key)?;
        self.primary_key = Some(key);
        Ok(self)
    }

    pub fn add_unique(self, name: impl Into<String>, columns: &[&str]) -> Result<Self> {
        self.add_unique_constraint(KeyConstraint::new(name, columns))
    }

    pub fn add_unique_constraint(mut self, key: KeyConstraint) -> Result<Self> {
        self.check_key(&key)?;
        self.unique.push(key);
        Ok(self)
    }

    pub fn add_foreign_key(mut self, mut fk: ForeignKey) -> Result<Self> {
        check_naming_rules(&fk.name)?;
        if fk.columns.is_empty() || fk.columns.len() != fk.ref_columns.len() {
            return Err(Error::invalid_schema(format!(
                "Foreign key {} must map the same non-zero number of columns",
                fk.name
            )));
        }
        if let Some(missing) = fk.columns.iter().find(|c| !self.has_column(c)) {
            return Err(Error::invalid_schema(format!("Column not found: {}", missing)));
        }
        fk.table = self.name.clone();
        self.foreign_keys.push(fk);
        Ok(self)
    }

    pub fn add_check(mut self, check: CheckConstraint) -> Result<Self> {
        check_naming_rules(&check.name)?;
        self.checks.push(check);
        Ok(self)
    }

    /// Builds the table definition. Primary key columns become NOT NULL.
    pub fn build(self) -> Result<Table> {
        if self.columns.is_empty() {
            return Err(Error::invalid_schema(format!(
                "Table {} has no columns",
                self.name
            )));
        }

        let pk_columns: Vec<String> = self
            .primary_key
            .as_ref()
            .map(|pk| pk.columns.clone())
            .unwrap_or_default();

        let columns: Vec<Column> = self
            .columns
            .into_iter()
            .enumerate()
            .map(|(i, c)| {
                let c = if pk_columns.iter().any(|p| p == c.name()) {
                    c.nullable(false)
                } else {
                    c
                };
                c.with_index(i)
            })
            .collect();

        let not_nullable = columns
            .iter()
            .filter(|c| !c.is_nullable())
            .map(|c| c.name().to_string())
            .collect();

        let mut constraints = Constraints::new().not_nullable(not_nullable);
        if let Some(pk) = self.primary_key {
            constraints = constraints.primary_key(pk);
        }
        for key in self.unique {
            constraints = constraints.add_unique(key);
        }
        for fk in self.foreign_keys {
            constraints = constraints.add_foreign_key(fk);
        }
        for check in self.checks {
            constraints = constraints.add_check(check);
        }

        Ok(Table {
            name: self.name,
            columns,
            constraints,
        })
    }

    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name() == name)
    }

    fn check_key(&self, key: &KeyConstraint) -> Result<()> {
        check_naming_rules(&key.name)?;
        if key.columns.is_empty() {
            return Err(Error::invalid_schema(format!("Key {} has no columns", key.name)));
        }
        match key.columns.iter().find(|c| !self.has_column(c)) {
            Some(missing) => Err(Error::invalid_schema(format!("Column not found: {}", missing))),
            None => Ok(()),
        }
    }
}

/// Names start with a letter or underscore and contain only ASCII
/// alphanumerics and underscores.
fn check_naming_rules(name: &str) -> Result<()> {
    let first = name
        .chars()
        .next()
        .ok_or_else(|| Error::invalid_schema("Name cannot be empty"))?;
    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(Error::invalid_schema(format!(
            "Name must start with letter or underscore: {}",
            name
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::invalid_schema(format!(
            "Name contains invalid characters: {}",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ConstraintAction;

    fn orders() -> Table {
        TableBuilder::new("orders")
            .unwrap()
            .add_column("id", DataType::Int64)
            .unwrap()
            .add_column("customer_id", DataType::Int64)
            .unwrap()
            .add_column("note", DataType::String)
            .unwrap()
            .add_nullable(&["customer_id", "note"])
            .add_primary_key(&["id"])
            .unwrap()
            .add_foreign_key(
                ForeignKey::new("fk_customer", &["customer_id"], "customers", &["id"])
                    .on_delete(ConstraintAction::Cascade),
            )
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_table_builder() {
        let table = orders();
        assert_eq!(table.name(), "orders");
        assert_eq!(table.column_count(), 3);
        assert_eq!(table.primary_key().unwrap().name, "pk_orders");
        assert_eq!(table.constraints().get_foreign_keys()[0].table, "orders");
        assert_eq!(table.constraints().get_not_nullable(), &["id".to_string()]);
    }

    #[test]
    fn test_column_indices() {
        let table = orders();
        assert_eq!(table.column_indices(&["note", "id"]).unwrap(), vec![2, 0]);
        assert!(table.column_indices(&["missing"]).is_err());
    }

    #[test]
    fn test_primary_key_forces_not_null() {
        let table = TableBuilder::new("t")
            .unwrap()
            .add_column("id", DataType::Int64)
            .unwrap()
            .add_nullable(&["id"])
            .add_primary_key(&["id"])
            .unwrap()
            .build()
            .unwrap();
        assert!(!table.get_column("id").unwrap().is_nullable());
    }

    #[test]
    fn test_invalid_definitions() {
        assert!(TableBuilder::new("1bad").is_err());
        assert!(TableBuilder::new("t")
            .unwrap()
            .add_column("id", DataType::Int64)
            .unwrap()
            .add_column("id", DataType::Int64)
            .is_err());
        assert!(TableBuilder::new("t")
            .unwrap()
            .add_column("a", DataType::Int64)
            .unwrap()
            .add_foreign_key(ForeignKey::new("fk", &["a"], "p", &["x", "y"]))
            .is_err());
        assert!(TableBuilder::new("empty").unwrap().build().is_err());
    }
}
