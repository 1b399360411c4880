//! Planner tests over a small in-memory registry

use crate::catalog::{DataSource, MemorySource, SourceRegistry};
use crate::common::error::{FederationError, FederationResult};
use crate::config::PlannerConfig;
use crate::parser::{parse_query, LiteralValue};
use crate::planner::filters::{FilterCondition, FilterOperator, FilterValue};
use crate::planner::plan::{Plan, StepKind};
use crate::planner::{plan_query, QueryPlanner};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn table(columns: &[&str], federated: bool) -> Arc<dyn DataSource> {
    let columns = columns.iter().map(|c| c.to_string()).collect();
    Arc::new(MemorySource::new(columns, Vec::new(), federated).unwrap())
}

fn registry() -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    registry
        .register("crm", "deals", table(&["id", "stage", "amount", "owner_id", "closed_at"], true))
        .unwrap();
    registry
        .register("crm", "owners", table(&["id", "name", "region"], true))
        .unwrap();
    registry
        .register("local", "users", table(&["id", "name", "email"], false))
        .unwrap();
    registry.register("web", "t", table(&["a", "b", "date"], true)).unwrap();
    registry.register("web", "t1", table(&["id", "a"], true)).unwrap();
    registry.register("web", "t2", table(&["id", "x", "y"], true)).unwrap();
    registry
}

fn plan(sql: &str) -> FederationResult<Plan> {
    plan_query(&parse_query(sql)?, &registry())
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn eq_filter(column: &str, value: &str) -> FilterCondition {
    FilterCondition::new(
        column,
        FilterOperator::Eq,
        FilterValue::Scalar(LiteralValue::String(value.into())),
    )
}

#[test]
fn test_single_table_pushdown() -> FederationResult<()> {
    let plan = plan("SELECT id, amount FROM crm.deals WHERE stage = 'won' ORDER BY amount DESC")?;
    assert_eq!(plan.len(), 2);

    let fetch = plan.steps()[0].as_fetch().unwrap();
    assert_eq!(fetch.source, "crm");
    assert_eq!(fetch.columns, strings(&["id", "stage", "amount"]));
    assert_eq!(fetch.filters, vec![eq_filter("stage", "won")]);
    assert_eq!(fetch.limit_hint, None);

    let last = plan.final_step();
    assert!(last.is_final);
    assert_eq!(last.inputs, vec![0]);
    assert_eq!(last.columns, strings(&["id", "amount"]));
    assert_eq!(
        last.kind.sql().unwrap(),
        "SELECT \"id\", \"amount\" FROM \"step_0\" AS \"deals\" WHERE \"stage\" = 'won' ORDER BY \"amount\" DESC"
    );
    Ok(())
}

#[test]
fn test_order_by_stays_on_final_step() -> FederationResult<()> {
    let query = parse_query("SELECT d.id FROM crm.deals d ORDER BY d.amount DESC, d.id LIMIT 3")?;
    let plan = plan_query(&query, &registry())?;

    let final_query = plan.final_step().kind.query().unwrap();
    assert_eq!(final_query.order_by, query.order_by);
    assert_eq!(final_query.limit, Some(3));
    // Ordering makes the limit unsafe to forward
    assert_eq!(plan.steps()[0].as_fetch().unwrap().limit_hint, None);
    Ok(())
}

#[test]
fn test_is_null_column_is_fetched() -> FederationResult<()> {
    let plan = plan("SELECT id FROM crm.deals WHERE owner_id IS NOT NULL")?;
    let fetch = plan.steps()[0].as_fetch().unwrap();
    assert!(fetch.columns.contains(&"owner_id".to_string()));
    assert!(fetch.filters.is_empty());
    Ok(())
}

#[test]
fn test_null_comparison_with_filter() -> FederationResult<()> {
    let plan = plan("SELECT a, b FROM t WHERE t.date = '2024-01-01' AND t.date IS NOT NULL")?;
    let fetch = plan.steps()[0].as_fetch().unwrap();
    assert_eq!(fetch.filters, vec![eq_filter("date", "2024-01-01")]);
    assert_eq!(fetch.columns, strings(&["a", "b", "date"]));
    assert!(plan
        .final_step()
        .kind
        .sql()
        .unwrap()
        .ends_with("AND (\"t\".\"date\" IS NOT NULL)"));
    Ok(())
}

#[test]
fn test_or_disables_join_pushdown() -> FederationResult<()> {
    let plan = plan(
        "SELECT d.id, o.name FROM crm.deals d JOIN crm.owners o ON d.owner_id = o.id \
         WHERE d.stage = 'won' OR o.region = 'EU'",
    )?;
    let fetches: Vec<_> = plan.fetch_steps().map(|(_, f)| f).collect();
    assert_eq!(fetches.len(), 2);
    assert!(fetches.iter().all(|f| f.filters.is_empty()));
    assert_eq!(fetches[0].columns, strings(&["id", "stage", "owner_id"]));
    assert_eq!(fetches[1].columns, strings(&["id", "name", "region"]));

    let join = plan.final_step().as_join().unwrap();
    assert!(join.sql.contains("WHERE (\"d\".\"stage\" = 'won') OR (\"o\".\"region\" = 'EU')"));
    Ok(())
}

#[test]
fn test_join_keeps_columns_used_in_residual_predicates() -> FederationResult<()> {
    let plan = plan("SELECT a, t2.x FROM t1 JOIN t2 ON t1.id = t2.id WHERE LOWER(t2.y) LIKE '%z%'")?;
    let t2 = plan.steps()[1].as_fetch().unwrap();
    assert_eq!(t2.table, "t2");
    assert_eq!(t2.columns, strings(&["id", "x", "y"]));
    assert!(t2.filters.is_empty());
    Ok(())
}

#[test]
fn test_filter_column_excluded_unless_referenced() -> FederationResult<()> {
    let plan = plan(
        "SELECT d.stage, o.name FROM crm.deals d JOIN crm.owners o ON d.owner_id = o.id \
         WHERE d.stage = 'won' AND o.region = 'EU'",
    )?;
    let deals = plan.steps()[0].as_fetch().unwrap();
    let owners = plan.steps()[1].as_fetch().unwrap();

    // stage is also a target, so it is fetched and re-checked
    assert_eq!(deals.columns, strings(&["stage", "owner_id"]));
    assert_eq!(deals.filters, vec![eq_filter("stage", "won")]);
    assert_eq!(owners.columns, strings(&["id", "name"]));
    assert_eq!(owners.filters, vec![eq_filter("region", "EU")]);

    let join = plan.final_step();
    assert_eq!(join.inputs, vec![0, 1]);
    assert_eq!(
        join.kind.sql().unwrap(),
        "SELECT \"d\".\"stage\", \"o\".\"name\" FROM \"step_0\" AS \"d\" JOIN \"step_1\" AS \"o\" \
         ON \"d\".\"owner_id\" = \"o\".\"id\" WHERE \"d\".\"stage\" = 'won'"
    );
    assert_eq!(join.as_join().unwrap().conditions.len(), 1);
    Ok(())
}

#[test]
fn test_outer_join_nullable_side_keeps_filter() -> FederationResult<()> {
    let plan = plan(
        "SELECT d.id, o.name FROM crm.deals d LEFT JOIN crm.owners o ON d.owner_id = o.id \
         WHERE o.region = 'EU'",
    )?;
    let owners = plan.steps()[1].as_fetch().unwrap();
    assert_eq!(owners.columns, strings(&["id", "name", "region"]));
    assert_eq!(owners.filters, vec![eq_filter("region", "EU")]);
    assert!(plan.final_step().kind.sql().unwrap().ends_with("WHERE \"o\".\"region\" = 'EU'"));
    Ok(())
}

#[test]
fn test_join_with_local_table() -> FederationResult<()> {
    let plan = plan("SELECT d.id, u.email FROM crm.deals d JOIN local.users u ON d.owner_id = u.id")?;
    assert_eq!(plan.len(), 3);

    let local = plan.steps()[1].as_local().unwrap();
    assert_eq!(local.sql, "SELECT \"id\", \"email\" FROM \"local__users\" AS \"users\"");
    assert_eq!(local.local_tables[0].relation, "local__users");

    assert_eq!(
        plan.final_step().kind.sql().unwrap(),
        "SELECT \"d\".\"id\", \"u\".\"email\" FROM \"step_0\" AS \"d\" JOIN \"step_1\" AS \"u\" \
         ON \"d\".\"owner_id\" = \"u\".\"id\""
    );
    Ok(())
}

#[test]
fn test_local_query_runs_verbatim() -> FederationResult<()> {
    let plan = plan("SELECT name FROM users WHERE id > 2")?;
    assert_eq!(plan.len(), 1);
    let local = plan.final_step().as_local().unwrap();
    assert_eq!(local.sql, "SELECT \"name\" FROM \"users\" WHERE \"id\" > 2");
    assert_eq!(local.local_tables[0].relation, "users");
    assert!(plan.final_step().inputs.is_empty());
    Ok(())
}

#[test]
fn test_cte_binding_is_eliminated() -> FederationResult<()> {
    let plan = plan(
        "WITH won AS (SELECT id, owner_id FROM crm.deals WHERE stage = 'won') \
         SELECT w.id, o.name FROM won w JOIN crm.owners o ON w.owner_id = o.id",
    )?;
    assert!(!plan.has_cte_binding());
    assert_eq!(plan.fetch_steps().count(), 2);

    let join = plan.final_step();
    assert_eq!(join.inputs, vec![1, 2]);
    assert!(join.kind.sql().unwrap().contains("FROM \"step_1\" AS \"w\""));
    Ok(())
}

#[test]
fn test_nested_cte_bindings_are_eliminated() -> FederationResult<()> {
    let derived = plan(
        "SELECT s.id FROM (WITH won AS (SELECT id FROM crm.deals WHERE stage = 'won') \
         SELECT id FROM won) s",
    )?;
    assert!(!derived.has_cte_binding());
    assert_eq!(derived.len(), 4);
    assert_eq!(derived.fetch_steps().count(), 1);
    assert_eq!(derived.steps()[2].inputs, vec![1]);
    assert_eq!(
        derived.final_step().kind.sql().unwrap(),
        "SELECT \"s\".\"id\" FROM \"step_2\" AS \"s\""
    );

    let in_subquery = plan(
        "SELECT name FROM crm.owners WHERE id IN \
         (WITH w AS (SELECT owner_id FROM crm.deals) SELECT owner_id FROM w)",
    )?;
    assert!(!in_subquery.has_cte_binding());
    assert_eq!(in_subquery.fetch_steps().count(), 2);
    for step in in_subquery.steps() {
        if let Some(sql) = step.kind.sql() {
            assert!(!sql.contains("WITH"), "{}", sql);
        }
    }
    assert!(in_subquery
        .final_step()
        .kind
        .sql()
        .unwrap()
        .contains("IN (SELECT * FROM \"step_2\" AS \"step_2\")"));
    Ok(())
}

#[test]
fn test_cte_referenced_twice_is_fetched_once() -> FederationResult<()> {
    let plan = plan(
        "WITH w AS (SELECT id, owner_id FROM crm.deals WHERE stage = 'won') \
         SELECT a.id FROM w a JOIN w b ON a.owner_id = b.id",
    )?;
    assert_eq!(plan.fetch_steps().count(), 1);
    assert_eq!(plan.final_step().inputs, vec![1]);
    Ok(())
}

#[test]
fn test_cte_shadows_registered_table() -> FederationResult<()> {
    let plan = plan("WITH deals AS (SELECT id FROM crm.deals) SELECT id FROM deals")?;
    assert_eq!(plan.len(), 3);
    assert_eq!(plan.final_step().inputs, vec![1]);
    assert_eq!(
        plan.final_step().kind.sql().unwrap(),
        "SELECT \"id\" FROM \"step_1\" AS \"deals\""
    );
    Ok(())
}

#[test]
fn test_later_cte_sees_earlier_one() -> FederationResult<()> {
    let plan = plan(
        "WITH a AS (SELECT id, amount FROM crm.deals), b AS (SELECT id FROM a WHERE amount > 10) \
         SELECT id FROM b",
    )?;
    assert_eq!(plan.fetch_steps().count(), 1);
    assert_eq!(plan.steps()[2].inputs, vec![1]);
    assert_eq!(plan.final_step().inputs, vec![2]);
    Ok(())
}

#[test]
fn test_derived_table_is_planned_first() -> FederationResult<()> {
    let plan = plan(
        "SELECT s.total FROM (SELECT owner_id, SUM(amount) AS total FROM crm.deals GROUP BY owner_id) s \
         WHERE s.total > 10",
    )?;
    assert_eq!(plan.len(), 3);
    assert_eq!(plan.steps()[1].columns, strings(&["owner_id", "total"]));
    assert_eq!(
        plan.final_step().kind.sql().unwrap(),
        "SELECT \"s\".\"total\" FROM \"step_1\" AS \"s\" WHERE \"s\".\"total\" > 10"
    );
    Ok(())
}

#[test]
fn test_in_subquery_becomes_input() -> FederationResult<()> {
    let plan = plan("SELECT name FROM crm.owners WHERE id IN (SELECT owner_id FROM crm.deals WHERE stage = 'won')")?;
    assert_eq!(plan.len(), 4);

    let owners = plan.steps()[2].as_fetch().unwrap();
    assert_eq!(owners.columns, strings(&["id", "name"]));
    assert!(owners.filters.is_empty());

    let last = plan.final_step();
    assert_eq!(last.inputs, vec![1, 2]);
    assert!(last
        .kind
        .sql()
        .unwrap()
        .contains("\"id\" IN (SELECT * FROM \"step_1\" AS \"step_1\")"));
    Ok(())
}

#[test]
fn test_query_without_from() -> FederationResult<()> {
    let plan = plan("SELECT 1 AS one")?;
    assert_eq!(plan.len(), 1);
    assert_eq!(plan.final_step().columns, strings(&["one"]));
    assert!(matches!(plan.final_step().kind, StepKind::LocalExec(_)));
    Ok(())
}

#[test]
fn test_fetch_columns_follow_declared_order() -> FederationResult<()> {
    let plan = plan("SELECT closed_at, amount, id FROM crm.deals")?;
    let fetch = plan.steps()[0].as_fetch().unwrap();
    assert_eq!(fetch.columns, strings(&["id", "amount", "closed_at"]));
    assert_eq!(plan.final_step().columns, strings(&["closed_at", "amount", "id"]));
    Ok(())
}

#[test]
fn test_non_plain_targets_fetch_everything() -> FederationResult<()> {
    let count = plan("SELECT COUNT(*) AS n FROM crm.deals WHERE stage = 'won'")?;
    let fetch = count.steps()[0].as_fetch().unwrap();
    assert_eq!(fetch.columns, strings(&["id", "stage", "amount", "owner_id", "closed_at"]));
    assert_eq!(fetch.limit_hint, None);

    let star = plan("SELECT * FROM crm.deals WHERE stage = 'won'")?;
    let fetch = star.steps()[0].as_fetch().unwrap();
    assert_eq!(fetch.columns, strings(&["id", "stage", "amount", "owner_id", "closed_at"]));
    Ok(())
}

#[test]
fn test_empty_projection_falls_back_to_all_columns() -> FederationResult<()> {
    let plan = plan("SELECT 1 AS one FROM crm.deals d CROSS JOIN crm.owners o")?;
    let owners = plan.steps()[1].as_fetch().unwrap();
    assert_eq!(owners.columns, strings(&["id", "name", "region"]));
    assert!(plan.final_step().as_join().unwrap().conditions.is_empty());
    Ok(())
}

#[test]
fn test_limit_hint() -> FederationResult<()> {
    let query = parse_query("SELECT id FROM crm.deals WHERE stage = 'won' LIMIT 5")?;
    let registry = registry();

    let plan = plan_query(&query, &registry)?;
    assert_eq!(plan.steps()[0].as_fetch().unwrap().limit_hint, Some(5));

    let config = PlannerConfig {
        push_limit_hint: false,
        ..PlannerConfig::default()
    };
    let plan = QueryPlanner::with_config(&registry, config).plan(&query)?;
    assert_eq!(plan.steps()[0].as_fetch().unwrap().limit_hint, None);

    let plan = plan_query(&parse_query("SELECT id FROM crm.deals WHERE amount + 1 > 5 LIMIT 5")?, &registry)?;
    assert_eq!(plan.steps()[0].as_fetch().unwrap().limit_hint, None);
    Ok(())
}

#[test]
fn test_target_alias_in_order_by() -> FederationResult<()> {
    let plan = plan("SELECT id AS deal FROM crm.deals ORDER BY deal")?;
    assert_eq!(plan.steps()[0].as_fetch().unwrap().columns, strings(&["id"]));
    assert_eq!(plan.final_step().columns, strings(&["deal"]));
    Ok(())
}

#[test]
fn test_relation_prefix() -> FederationResult<()> {
    let registry = registry();
    let config = PlannerConfig {
        relation_prefix: "r".into(),
        ..PlannerConfig::default()
    };
    let plan = QueryPlanner::with_config(&registry, config).plan(&parse_query("SELECT id FROM crm.deals")?)?;
    assert_eq!(plan.steps()[0].output, "r_0");
    assert!(plan.final_step().kind.sql().unwrap().contains("\"r_0\""));
    Ok(())
}

#[test]
fn test_planning_is_deterministic() -> FederationResult<()> {
    let query = parse_query(
        "WITH w AS (SELECT id, owner_id FROM crm.deals WHERE stage = 'won') \
         SELECT w.id, o.name FROM w JOIN crm.owners o ON w.owner_id = o.id ORDER BY o.name",
    )?;
    let registry = registry();
    let first = plan_query(&query, &registry)?;
    let second = plan_query(&query, &registry)?;
    assert_eq!(first, second);

    let plain = parse_query("SELECT id FROM crm.deals WHERE stage = 'won'")?;
    assert_eq!(plan_query(&plain, &registry)?, plan_query(&plain, &registry)?);
    Ok(())
}

/// Plan `sql`, then plan its final step's elaborated query again
fn assert_replans_identically(sql: &str) -> FederationResult<()> {
    let registry = registry();
    let original = plan_query(&parse_query(sql)?, &registry)?;
    let elaborated = original
        .final_step()
        .kind
        .query()
        .cloned()
        .ok_or_else(|| crate::internal_err!("final step of '{}' carries no query", sql))?;
    assert!(!elaborated.has_cte_binding());

    let again = QueryPlanner::new(&registry).replan(&original, &elaborated)?;
    assert_eq!(again, original, "{}", sql);
    Ok(())
}

#[test]
fn test_elaborated_query_replans_identically() -> FederationResult<()> {
    assert_replans_identically("WITH w AS (SELECT id FROM crm.deals WHERE stage = 'won') SELECT id FROM w")?;
    assert_replans_identically("SELECT id, amount FROM crm.deals WHERE stage = 'won' ORDER BY amount DESC")?;
    assert_replans_identically(
        "WITH won AS (SELECT id, owner_id FROM crm.deals WHERE stage = 'won') \
         SELECT w.id, o.name FROM won w JOIN crm.owners o ON w.owner_id = o.id WHERE o.region = 'EU'",
    )?;
    assert_replans_identically(
        "SELECT d.id, o.name FROM crm.deals d LEFT JOIN crm.owners o ON d.owner_id = o.id \
         WHERE o.region = 'US' ORDER BY d.id",
    )?;
    assert_replans_identically(
        "SELECT d.id, u.email FROM crm.deals d JOIN local.users u ON d.owner_id = u.id WHERE d.amount > 40",
    )?;
    assert_replans_identically(
        "WITH w AS (SELECT id FROM crm.deals) SELECT w.id, u.email FROM w JOIN local.users u ON w.id = u.id",
    )?;
    assert_replans_identically(
        "SELECT name FROM crm.owners WHERE id IN (SELECT owner_id FROM crm.deals WHERE stage = 'won')",
    )?;
    assert_replans_identically(
        "SELECT s.total FROM (SELECT owner_id, SUM(amount) AS total FROM crm.deals GROUP BY owner_id) s",
    )?;
    assert_replans_identically("SELECT name FROM users WHERE id > 2")?;
    Ok(())
}

#[test]
fn test_replan_rejects_foreign_prefix() -> FederationResult<()> {
    let registry = registry();
    let original = plan_query(&parse_query("SELECT id FROM crm.deals")?, &registry)?;
    let config = PlannerConfig {
        relation_prefix: "r".into(),
        ..PlannerConfig::default()
    };
    let query = original.final_step().kind.query().cloned().unwrap();
    assert!(matches!(
        QueryPlanner::with_config(&registry, config).replan(&original, &query),
        Err(FederationError::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn test_planning_errors() {
    assert!(matches!(
        plan("SELECT id FROM crm.missing"),
        Err(FederationError::UnresolvedRelation(_))
    ));

    match plan("SELECT nope FROM crm.deals") {
        Err(FederationError::UnsupportedColumn { table, column }) => {
            assert_eq!(table, "crm.deals");
            assert_eq!(column, "nope");
        }
        other => panic!("expected UnsupportedColumn, got {:?}", other),
    }

    assert!(matches!(
        plan("SELECT x.id FROM crm.deals d JOIN crm.owners o ON d.owner_id = o.id"),
        Err(FederationError::UnsupportedColumn { .. })
    ));
    assert!(matches!(
        plan("SELECT d.id FROM crm.deals d JOIN crm.owners d ON d.owner_id = d.id"),
        Err(FederationError::InvalidArgument(_))
    ));
    assert!(matches!(plan("SELECT *"), Err(FederationError::InvalidArgument(_))));
}

#[test]
fn test_correlated_subquery_is_rejected() {
    match plan("SELECT id FROM crm.deals d WHERE EXISTS (SELECT 1 FROM crm.owners o WHERE o.id = d.owner_id)") {
        Err(FederationError::UnsupportedColumn { table, column }) => {
            assert_eq!(table, "d");
            assert_eq!(column, "owner_id");
        }
        other => panic!("expected UnsupportedColumn, got {:?}", other),
    }
}
