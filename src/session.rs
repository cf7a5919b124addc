//! Per-session state of the segment dashboard and the handlers that act on it.
//!
//! A [`Session`] owns the tree under edit, the name of the saved filter it was
//! loaded from, and the directory cursor. The store and the dataset are passed
//! in by the caller on every request.

use thiserror::Error;
use tracing::{debug, warn};

use crate::condition::ConditionTree;
use crate::dataset::{Dataset, Row, Selection};
use crate::evaluator::EvalError;
use crate::query_compiler::{CompileError, QueryCompiler};
use crate::rewrite::rewrite_null_checks;
use crate::schema::Schema;
use crate::sql_compiler::SegmentSqlCompiler;
use crate::store::{FilterStore, SavedFilter, StoreError};

/// Column summed into the sales estimate
pub const SALES_FIELD: &str = "total_harga_item";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    /// A missing saved filter is reported but leaves the session usable
    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::Store(StoreError::NotFound(_)))
    }
}

/// Whole tree plus its compiled query, emitted on every builder change
#[derive(Debug, Clone, PartialEq)]
pub struct BuilderUpdate {
    pub tree: ConditionTree,
    pub query: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct DirectoryCursor {
    search: Option<String>,
    page: usize,
}

/// One page of the saved filter directory
#[derive(Debug, Clone)]
pub struct DirectoryPage {
    pub filters: Vec<SavedFilter>,
    /// Zero-based
    pub page: usize,
    pub pages: usize,
    pub total: usize,
}

/// Result of applying the active segment to a dataset
#[derive(Debug)]
pub struct FilterOutcome<'a> {
    /// Compiled query as produced by the builder
    pub query: String,
    /// The query after null-syntax rewriting, as evaluated
    pub rewritten: String,
    pub selection: Selection<'a>,
    pub total: usize,
    pub total_sales: f64,
}

impl<'a> FilterOutcome<'a> {
    pub fn matched(&self) -> usize {
        self.selection.len()
    }

    pub fn preview(&self, limit: usize) -> impl Iterator<Item = &'a Row> + '_ {
        self.selection.rows().take(limit)
    }
}

pub struct Session {
    schema: Schema,
    tree: ConditionTree,
    editing: Option<String>,
    directory: DirectoryCursor,
    page_size: usize,
}

impl Session {
    pub fn new(schema: Schema, page_size: usize) -> Self {
        Self {
            schema,
            tree: ConditionTree::empty(),
            editing: None,
            directory: DirectoryCursor::default(),
            page_size: page_size.max(1),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn tree(&self) -> &ConditionTree {
        &self.tree
    }

    /// Name of the saved filter being edited, if any
    pub fn editing(&self) -> Option<&str> {
        self.editing.as_deref()
    }

    pub fn query(&self) -> Result<String, CompileError> {
        QueryCompiler::new(&self.schema).compile(&self.tree)
    }

    /// Sets the directory search term and returns its first page
    pub fn directory(&mut self, store: &dyn FilterStore, search: Option<&str>) -> Result<DirectoryPage, SessionError> {
        self.directory = DirectoryCursor {
            search: search.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string),
            page: 0,
        };
        self.current_page(store)
    }

    pub fn next_page(&mut self, store: &dyn FilterStore) -> Result<DirectoryPage, SessionError> {
        self.directory.page += 1;
        self.current_page(store)
    }

    pub fn prev_page(&mut self, store: &dyn FilterStore) -> Result<DirectoryPage, SessionError> {
        self.directory.page = self.directory.page.saturating_sub(1);
        self.current_page(store)
    }

    fn current_page(&mut self, store: &dyn FilterStore) -> Result<DirectoryPage, SessionError> {
        let all = store.list(self.directory.search.as_deref())?;
        let total = all.len();
        let pages = total.div_ceil(self.page_size).max(1);
        let page = self.directory.page.min(pages - 1);
        self.directory.page = page;

        let filters = all.into_iter().skip(page * self.page_size).take(self.page_size).collect();
        Ok(DirectoryPage { filters, page, pages, total })
    }

    /// Starts a fresh, empty segment
    pub fn new_segment(&mut self) -> BuilderUpdate {
        self.tree = ConditionTree::empty();
        self.editing = None;
        BuilderUpdate { tree: self.tree.clone(), query: String::new() }
    }

    /// Loads a saved filter into the builder.
    ///
    /// A missing name falls back to an empty segment and reports `NotFound`.
    pub fn edit_segment(&mut self, store: &dyn FilterStore, name: &str) -> Result<BuilderUpdate, SessionError> {
        let tree = match store.get_tree(name) {
            Ok(tree) => tree,
            Err(err @ StoreError::NotFound(_)) => {
                warn!(name, "saved filter disappeared, starting an empty segment");
                self.new_segment();
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };

        let query = QueryCompiler::new(&self.schema).compile(&tree)?;
        self.tree = tree;
        self.editing = Some(name.trim().to_string());
        Ok(BuilderUpdate { tree: self.tree.clone(), query })
    }

    /// Replaces the whole tree; rejected trees leave the session unchanged
    pub fn replace_tree(&mut self, tree: ConditionTree) -> Result<BuilderUpdate, SessionError> {
        let query = QueryCompiler::new(&self.schema).compile(&tree)?;
        debug!(query = %query, "builder tree replaced");
        self.tree = tree;
        Ok(BuilderUpdate { tree: self.tree.clone(), query })
    }

    /// Persists the active tree under `name`, renaming the edited filter when
    /// the name changed
    pub fn save(&mut self, store: &dyn FilterStore, name: &str) -> Result<SavedFilter, SessionError> {
        let saved = store.save_or_update(name, &self.tree, self.editing.as_deref())?;
        self.editing = Some(saved.name.clone());
        Ok(saved)
    }

    pub fn delete(&mut self, store: &dyn FilterStore, name: &str) -> Result<bool, SessionError> {
        let removed = store.delete(name)?;
        if self.editing.as_deref() == Some(name.trim()) {
            self.new_segment();
        }
        Ok(removed)
    }

    /// Compiles, rewrites and evaluates the active tree against `dataset`
    pub fn apply<'d>(&self, dataset: &'d Dataset) -> Result<FilterOutcome<'d>, SessionError> {
        let query = QueryCompiler::new(dataset.schema()).compile(&self.tree)?;
        let rewritten = rewrite_null_checks(&query);
        let selection = dataset.query(&rewritten)?;
        let total_sales = selection.sum(SALES_FIELD).unwrap_or(0.0);

        debug!(query = %rewritten, matched = selection.len(), total = dataset.len(), "applied segment");
        Ok(FilterOutcome {
            query,
            rewritten,
            selection,
            total: dataset.len(),
            total_sales,
        })
    }

    /// PostgreSQL rendering of the active segment
    pub fn sql(&self) -> Result<String, SessionError> {
        Ok(SegmentSqlCompiler::new(&self.schema).to_sql(&self.tree)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Group, Operand, Operator, Rule};
    use crate::generator::{generate, GeneratorConfig};
    use crate::store::SledFilterStore;
    use chrono::NaiveDate;

    fn dataset() -> Dataset {
        generate(&GeneratorConfig {
            seed: 3,
            days: 10,
            members: 30,
            random_products: 10,
            end_date: NaiveDate::from_ymd_opt(2024, 1, 15),
        })
        .unwrap()
    }

    fn store() -> SledFilterStore {
        SledFilterStore::temporary("user_dashboard").unwrap()
    }

    fn city(name: &str) -> ConditionTree {
        ConditionTree::empty().with_child(Rule::new("kota", Operator::Equal, vec![Operand::Text(name.into())]))
    }

    #[test]
    fn test_new_segment_is_empty() {
        let mut session = Session::new(Schema::retail(), 10);
        let update = session.new_segment();
        assert!(update.tree.is_empty());
        assert_eq!(update.query, "");
        assert_eq!(session.editing(), None);
    }

    #[test]
    fn test_replace_tree_emits_whole_tree_and_query() {
        let mut session = Session::new(Schema::retail(), 10);
        let update = session.replace_tree(city("Bandung")).unwrap();
        assert_eq!(update.tree, city("Bandung"));
        assert_eq!(update.query, r#"kota == "Bandung""#);
        assert_eq!(session.tree(), &city("Bandung"));
    }

    #[test]
    fn test_invalid_tree_is_rejected_without_changes() {
        let mut session = Session::new(Schema::retail(), 10);
        session.replace_tree(city("Bandung")).unwrap();

        let bad = ConditionTree::empty().with_child(Rule::new("loyalty", Operator::IsNull, vec![]));
        let err = session.replace_tree(bad).unwrap_err();
        assert!(matches!(err, SessionError::Compile(CompileError::UnknownField(_))));
        assert_eq!(session.tree(), &city("Bandung"));
    }

    #[test]
    fn test_save_edit_and_rename() {
        let store = store();
        let mut session = Session::new(Schema::retail(), 10);

        session.replace_tree(city("Bandung")).unwrap();
        session.save(&store, "Bandung").unwrap();
        assert_eq!(session.editing(), Some("Bandung"));

        session.new_segment();
        let loaded = session.edit_segment(&store, "Bandung").unwrap();
        assert_eq!(loaded.tree, city("Bandung"));

        session.replace_tree(city("Surabaya")).unwrap();
        session.save(&store, "Surabaya Shoppers").unwrap();

        assert!(matches!(store.get_tree("Bandung"), Err(StoreError::NotFound(_))));
        assert_eq!(store.get_tree("Surabaya Shoppers").unwrap(), city("Surabaya"));
        assert_eq!(session.editing(), Some("Surabaya Shoppers"));
    }

    #[test]
    fn test_editing_missing_filter_resets_session() {
        let store = store();
        let mut session = Session::new(Schema::retail(), 10);
        session.replace_tree(city("Bandung")).unwrap();

        let err = session.edit_segment(&store, "ghost").unwrap_err();
        assert!(err.is_not_found());
        assert!(session.tree().is_empty());
        assert_eq!(session.editing(), None);
    }

    #[test]
    fn test_deleting_the_edited_filter_resets_session() {
        let store = store();
        let mut session = Session::new(Schema::retail(), 10);
        session.replace_tree(city("Bandung")).unwrap();
        session.save(&store, "Bandung").unwrap();

        assert!(session.delete(&store, "Bandung").unwrap());
        assert!(session.tree().is_empty());
        assert!(!session.delete(&store, "Bandung").unwrap());
    }

    #[test]
    fn test_directory_pages_through_filters() {
        let store = store();
        let mut session = Session::new(Schema::retail(), 2);
        for name in ["one", "two", "three"] {
            store.save_or_update(name, &city("Bandung"), None).unwrap();
        }

        let first = session.directory(&store, None).unwrap();
        assert_eq!((first.page, first.pages, first.total), (0, 2, 3));
        assert_eq!(first.filters.len(), 2);

        let second = session.next_page(&store).unwrap();
        assert_eq!(second.page, 1);
        assert_eq!(second.filters.len(), 1);

        assert_eq!(session.next_page(&store).unwrap().page, 1);
        assert_eq!(session.prev_page(&store).unwrap().page, 0);
        assert_eq!(session.prev_page(&store).unwrap().page, 0);

        let searched = session.directory(&store, Some("T")).unwrap();
        assert_eq!(searched.total, 2);

        let empty = session.directory(&store, Some("nothing")).unwrap();
        assert_eq!((empty.page, empty.pages, empty.total), (0, 1, 0));
    }

    #[test]
    fn test_applying_empty_tree_returns_everything() {
        let data = dataset();
        let session = Session::new(data.schema().clone(), 10);
        let outcome = session.apply(&data).unwrap();
        assert_eq!(outcome.query, "");
        assert_eq!(outcome.matched(), data.len());
        assert_eq!(outcome.total, data.len());
        assert!(outcome.total_sales > 0.0);
    }

    #[test]
    fn test_applying_null_checks_goes_through_rewrite() {
        let data = dataset();
        let mut session = Session::new(data.schema().clone(), 10);
        session
            .replace_tree(ConditionTree::new(Group::or(vec![
                Rule::new("nama_member", Operator::IsNull, vec![]).into(),
                Rule::new("tanggal_join_member", Operator::IsNull, vec![]).into(),
            ])))
            .unwrap();

        let outcome = session.apply(&data).unwrap();
        assert_eq!(outcome.query, "nama_member == null OR tanggal_join_member == null");
        assert_eq!(outcome.rewritten, "nama_member.isnull() OR tanggal_join_member.isnull()");
        assert!(outcome.matched() > 0);
        assert!(outcome.matched() < outcome.total);
        assert!(outcome.preview(5).all(|row| row[12].is_null()));

        let anonymous_sales = outcome.total_sales;
        let everything = Session::new(data.schema().clone(), 10).apply(&data).unwrap();
        assert!(anonymous_sales < everything.total_sales);
    }

    #[test]
    fn test_sql_for_active_segment() {
        let mut session = Session::new(Schema::retail(), 10);
        session.replace_tree(city("Bandung")).unwrap();
        let sql = session.sql().unwrap();
        assert!(sql.contains(r#"WHERE "kota" = 'Bandung'"#));
    }
}
