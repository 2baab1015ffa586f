use citydb_cascade_delete::{
    create_backend, DatabaseDialect, DeleteError, DeleteScript, DeleteStep, InMemorySchema,
    RoutineRegistry, ScriptOptions, SynthesisOptions,
};

const SCHEMA: &str = "citydb";

async fn synthesize(dialect: DatabaseDialect, schema: &InMemorySchema) -> RoutineRegistry {
    synthesize_with(dialect, schema, SynthesisOptions::default())
        .await
        .unwrap()
}

async fn synthesize_with(
    dialect: DatabaseDialect,
    schema: &InMemorySchema,
    options: SynthesisOptions,
) -> Result<RoutineRegistry, DeleteError> {
    let backend = create_backend(dialect, options, ScriptOptions::default());
    backend.synthesize(schema, schema, SCHEMA).await
}

fn city_schema() -> InMemorySchema {
    InMemorySchema::new()
        .table("cityobject")
        .foreign_key("building", "cityobject_id", "cityobject", false)
        .foreign_key("address", "cityobject_id", "cityobject", true)
        .aggregation("building", "cityobject", true)
}

#[tokio::test]
async fn test_composition_child_gets_routine_and_association_does_not() {
    let registry = synthesize(DatabaseDialect::Postgis, &city_schema()).await;

    assert_eq!(registry.len(), 2);
    assert!(registry.contains("cityobject"));
    assert!(registry.contains("building"));
    assert!(!registry.contains("address"));

    let root = registry.root().unwrap();
    assert_eq!(root.table, "cityobject");
    assert_eq!(
        root.steps,
        vec![
            DeleteStep::DeleteChildren {
                table: "building".to_string(),
                column: "cityobject_id".to_string(),
                routine: "del_building".to_string(),
            },
            DeleteStep::DeleteOwnRow,
        ]
    );
    assert!(!root.definition.contains("address"));
}

#[tokio::test]
async fn test_nullable_self_reference_is_cleared_before_delete() {
    let schema = InMemorySchema::new()
        .table("t")
        .foreign_key("t", "parent_id", "t", true);
    let options = SynthesisOptions::new().root_table("t");
    let registry = synthesize_with(DatabaseDialect::Postgis, &schema, options)
        .await
        .unwrap();

    let routine = registry.get("t").unwrap();
    assert_eq!(
        routine.steps,
        vec![
            DeleteStep::NullifySelfReference {
                column: "parent_id".to_string()
            },
            DeleteStep::DeleteOwnRow,
        ]
    );

    let update = routine
        .definition
        .find("UPDATE citydb.t SET parent_id = NULL WHERE parent_id = pid;")
        .unwrap();
    let delete = routine.definition.find("DELETE FROM citydb.t WHERE id = pid").unwrap();
    assert!(update < delete);
}

#[tokio::test]
async fn test_mandatory_self_reference_deletes_descendants_recursively() {
    let schema = InMemorySchema::new()
        .table("t")
        .foreign_key("t", "parent_id", "t", false);
    let options = SynthesisOptions::new().root_table("t");
    let registry = synthesize_with(DatabaseDialect::Oracle, &schema, options)
        .await
        .unwrap();

    let routine = registry.get("t").unwrap();
    assert_eq!(
        routine.steps[0],
        DeleteStep::DeleteSelfReferencing {
            column: "parent_id".to_string()
        }
    );
    assert!(routine
        .definition
        .contains("FOR rec IN (SELECT id FROM t WHERE parent_id = pid AND id <> pid) LOOP"));
    assert!(routine.definition.contains("dummy_id := del_t(rec.id);"));
}

#[tokio::test]
async fn test_composition_cycle_terminates_with_one_routine_per_table() {
    let schema = InMemorySchema::new()
        .table("cityobject")
        .foreign_key("a", "cityobject_id", "cityobject", false)
        .foreign_key("a", "b_id", "b", false)
        .foreign_key("b", "a_id", "a", false)
        .aggregation("a", "cityobject", true)
        .aggregation("a", "b", true)
        .aggregation("b", "a", true);

    let registry = synthesize(DatabaseDialect::Postgis, &schema).await;
    assert_eq!(registry.len(), 3);
    assert!(registry.is_complete());
    assert_eq!(registry.get("a").unwrap().callees(), vec!["del_b"]);
    assert_eq!(registry.get("b").unwrap().callees(), vec!["del_a"]);
}

#[tokio::test]
async fn test_synthesis_is_idempotent() {
    let schema = city_schema();
    let first = synthesize(DatabaseDialect::Oracle, &schema).await;
    let second = synthesize(DatabaseDialect::Oracle, &schema).await;
    assert_eq!(first.inventory(), second.inventory());
    let first_defs: Vec<&str> = first.routines().map(|r| r.definition.as_str()).collect();
    let second_defs: Vec<&str> = second.routines().map(|r| r.definition.as_str()).collect();
    assert_eq!(first_defs, second_defs);
}

/// 子ルーチンの呼び出し行が、そのテーブル自身の DELETE 行より前にあることを確認する。
fn assert_children_called_before_own_delete(registry: &RoutineRegistry) {
    for routine in registry.routines() {
        let own_delete = routine
            .definition
            .find(&format!("{} WHERE id = pid RETURNING", routine.table))
            .unwrap_or_else(|| panic!("no own DELETE in {}", routine.name));
        for step in &routine.steps {
            if let DeleteStep::DeleteChildren { routine: callee, .. } = step {
                let call = routine
                    .definition
                    .find(&format!("{callee}(rec.id)"))
                    .unwrap_or_else(|| panic!("no call to {callee} in {}", routine.name));
                assert!(
                    call < own_delete,
                    "{callee} is called after the own DELETE in {}",
                    routine.name
                );
            }
        }
    }
}

#[tokio::test]
async fn test_both_dialects_share_delete_order() {
    let schema = city_schema()
        .foreign_key("thematic_surface", "building_id", "building", false)
        .aggregation("thematic_surface", "building", true)
        .foreign_key("appearance", "cityobject_id", "cityobject", true)
        .aggregation("appearance", "cityobject", false);

    let oracle = synthesize(DatabaseDialect::Oracle, &schema).await;
    let postgis = synthesize(DatabaseDialect::Postgis, &schema).await;

    assert_eq!(oracle.tables(), postgis.tables());
    for table in oracle.tables() {
        assert_eq!(
            oracle.get(table).unwrap().steps,
            postgis.get(table).unwrap().steps,
            "steps differ for {table}"
        );
    }
    assert_ne!(
        oracle.get("building").unwrap().definition,
        postgis.get("building").unwrap().definition
    );

    assert_children_called_before_own_delete(&oracle);
    assert_children_called_before_own_delete(&postgis);
}

#[tokio::test]
async fn test_junction_rows_are_deleted_but_far_side_is_kept() {
    let schema = city_schema()
        .table_with_key("address_to_building", &["address_id", "building_id"])
        .foreign_key("address_to_building", "address_id", "address", false)
        .foreign_key("address_to_building", "building_id", "building", false);

    for dialect in [DatabaseDialect::Oracle, DatabaseDialect::Postgis] {
        let backend = create_backend(dialect, SynthesisOptions::default(), ScriptOptions::default());
        let registry = backend.synthesize(&schema, &schema, SCHEMA).await.unwrap();

        assert!(!registry.contains("address"), "{dialect}");
        assert!(!registry.contains("address_to_building"), "{dialect}");

        let steps = &registry.get("building").unwrap().steps;
        let junction = steps
            .iter()
            .position(|s| {
                *s == DeleteStep::DeleteJunctionRows {
                    junction_table: "address_to_building".to_string(),
                    column: "building_id".to_string(),
                }
            })
            .unwrap();
        let own = steps
            .iter()
            .position(|s| *s == DeleteStep::DeleteOwnRow)
            .unwrap();
        assert!(junction < own, "{dialect}");

        let text = backend.emit(&registry).unwrap().render();
        assert!(text.contains("address_to_building WHERE building_id = pid;"));
        assert!(!text.contains("DELETE FROM address "), "{dialect}");
        assert!(!text.contains("DELETE FROM citydb.address "), "{dialect}");
        assert!(!text.contains("del_address"), "{dialect}");
    }
}

#[tokio::test]
async fn test_structural_parent_is_deleted_after_own_row() {
    let schema = InMemorySchema::new()
        .table("cityobject")
        .foreign_key("building", "id", "cityobject", false)
        .foreign_key("building_part", "building_id", "building", false)
        .aggregation("building_part", "building", true);
    let options = SynthesisOptions::new().root_table("building");

    let registry = synthesize_with(DatabaseDialect::Postgis, &schema, options)
        .await
        .unwrap();
    let building = registry.get("building").unwrap();
    assert_eq!(
        building.steps.last().unwrap(),
        &DeleteStep::DeleteParentRow {
            table: "cityobject".to_string(),
            routine: "del_cityobject".to_string(),
        }
    );
    assert!(registry.contains("cityobject"));
    // 主キーだけの参照は子として扱わない
    assert!(registry
        .get("cityobject")
        .unwrap()
        .callees()
        .is_empty());
}

#[tokio::test]
async fn test_metadata_failure_aborts_the_run() {
    let schema = city_schema().fail_on("building");
    let err = synthesize_with(DatabaseDialect::Postgis, &schema, SynthesisOptions::default())
        .await
        .unwrap_err();
    match err {
        DeleteError::SchemaIntrospection { table, .. } => assert_eq!(table, "building"),
        other => panic!("expected SchemaIntrospection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rendered_script_round_trips_through_parse() {
    let backend = create_backend(
        DatabaseDialect::Oracle,
        SynthesisOptions::default(),
        ScriptOptions::default().package_name("CITYDB_DELETE"),
    );
    let schema = city_schema();
    let registry = backend.synthesize(&schema, &schema, SCHEMA).await.unwrap();
    let script = backend.emit(&registry).unwrap();

    let text = script.render();
    assert!(text.contains("CREATE OR REPLACE PACKAGE citydb_delete"));
    assert!(text.contains("CREATE OR REPLACE PACKAGE BODY citydb_delete"));

    let parsed = DeleteScript::parse(&text).unwrap();
    assert_eq!(parsed.dialect, DatabaseDialect::Oracle);
    assert_eq!(parsed.routines, script.routines);
    assert_eq!(parsed.statements.len(), 1);
    let (header, body) = DeleteScript::split_package(&parsed.statements[0]).unwrap();
    assert!(header.contains("FUNCTION del_building(pid NUMBER) RETURN NUMBER;"));
    assert!(body.contains("END del_cityobject;"));
}
