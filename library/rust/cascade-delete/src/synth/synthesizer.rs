use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dialect::normalize_identifier;
use crate::emit::RoutineRenderer;
use crate::error::Result;
use crate::schema::{AggregationIndex, AggregationInfoSource, SchemaIntrospector, TableMetadata};
use crate::synth::naming::RoutineNamer;
use crate::synth::plan::{DeleteRoutine, DeleteStep, RelationshipEdge, RelationshipKind, TableNode};
use crate::synth::registry::RoutineRegistry;

fn default_root_table() -> String {
    "cityobject".to_string()
}

fn default_routine_prefix() -> String {
    "del_".to_string()
}

fn default_id_column() -> String {
    "id".to_string()
}

/// SynthesisOptions は削除ルーチン合成の設定。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisOptions {
    #[serde(default = "default_root_table")]
    pub root_table: String,
    #[serde(default = "default_routine_prefix")]
    pub routine_prefix: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            root_table: default_root_table(),
            routine_prefix: default_routine_prefix(),
            id_column: default_id_column(),
        }
    }
}

impl SynthesisOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root_table(mut self, table: impl Into<String>) -> Self {
        self.root_table = table.into();
        self
    }

    pub fn routine_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.routine_prefix = prefix.into();
        self
    }

    pub fn id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }
}

/// 1 回の合成処理が所有する状態。処理をまたいで共有しない。
struct SynthesisRun {
    index: AggregationIndex,
    namer: RoutineNamer,
    registry: RoutineRegistry,
    stack: Vec<String>,
}

impl SynthesisRun {
    /// 子テーブルのルーチン名を解決し、未登録なら予約して作業スタックに積む。
    fn require(&mut self, table: &str, discovered: &mut Vec<String>) -> Result<String> {
        let name = self.namer.name_for(table)?;
        if self.registry.reserve(table, &name) {
            discovered.push(table.to_string());
        }
        Ok(name)
    }
}

/// DeleteRoutineSynthesizer はルートテーブルから関係グラフを辿り、
/// 到達可能な各テーブルの削除ルーチンを合成する。
///
/// 再帰呼び出しの代わりに明示的な作業スタックを使い、各テーブルは
/// 「名前だけ予約」→「本体完成」の順に一度だけ処理される。
/// 自己参照や相互参照があっても予約済みのテーブルは再展開しない。
#[derive(Debug, Clone)]
pub struct DeleteRoutineSynthesizer {
    schema: String,
    options: SynthesisOptions,
}

impl DeleteRoutineSynthesizer {
    pub fn new(schema: impl Into<String>, options: SynthesisOptions) -> Self {
        Self {
            schema: schema.into(),
            options,
        }
    }

    pub fn options(&self) -> &SynthesisOptions {
        &self.options
    }

    /// 合成を実行する。途中で失敗した場合は登録簿を返さない。
    pub async fn synthesize(
        &self,
        introspector: &dyn SchemaIntrospector,
        aggregation: &dyn AggregationInfoSource,
        renderer: &dyn RoutineRenderer,
    ) -> Result<RoutineRegistry> {
        let dialect = renderer.dialect();
        let schema = normalize_identifier(&self.schema)?;
        let root = normalize_identifier(&self.options.root_table)?;
        let id_column = normalize_identifier(&self.options.id_column)?;

        let index = AggregationIndex::load(aggregation).await?;
        debug!(entries = index.len(), "aggregation index loaded");

        let mut run = SynthesisRun {
            index,
            namer: RoutineNamer::new(dialect, self.options.routine_prefix.clone()),
            registry: RoutineRegistry::new(),
            stack: Vec::new(),
        };
        let root_name = run.namer.name_for(&root)?;
        run.registry.reserve(&root, &root_name);
        run.stack.push(root.clone());

        while let Some(table) = run.stack.pop() {
            if !run.registry.is_pending(&table) {
                continue;
            }
            let metadata = introspector.describe(&table, &schema).await?;
            let mut discovered = Vec::new();
            let (node, steps) = plan_table(&mut run, &metadata, table == root, &mut discovered)?;

            let mut routine = DeleteRoutine {
                table: table.clone(),
                name: run.namer.name_for(&table)?,
                schema: schema.clone(),
                id_column: id_column.clone(),
                node,
                steps,
                declaration: String::new(),
                definition: String::new(),
            };
            routine.declaration = renderer.declaration(&routine);
            routine.definition = renderer.definition(&routine);
            debug!(
                table = %table,
                routine = %routine.name,
                steps = routine.steps.len(),
                "delete routine synthesized"
            );
            run.registry.complete(routine);

            // 最初に見つかった子から処理する
            run.stack.extend(discovered.into_iter().rev());
        }

        info!(
            dialect = %dialect,
            root = %root,
            routines = run.registry.len(),
            "delete routine synthesis completed"
        );
        Ok(run.registry)
    }
}

fn plan_table(
    run: &mut SynthesisRun,
    metadata: &TableMetadata,
    is_root: bool,
    discovered: &mut Vec<String>,
) -> Result<(TableNode, Vec<DeleteStep>)> {
    let table = metadata.table.to_ascii_lowercase();
    let mut edges = Vec::new();
    let mut steps = Vec::new();

    for self_ref in metadata.self_references.iter().filter(|s| !s.nullable) {
        steps.push(DeleteStep::DeleteSelfReferencing {
            column: self_ref.column.clone(),
        });
    }
    for self_ref in metadata.self_references.iter().filter(|s| s.nullable) {
        steps.push(DeleteStep::NullifySelfReference {
            column: self_ref.column.clone(),
        });
    }
    for self_ref in &metadata.self_references {
        edges.push(RelationshipEdge {
            parent_table: table.clone(),
            child_table: table.clone(),
            columns: vec![self_ref.column.clone()],
            kind: RelationshipKind::SelfReference,
            nullable: self_ref.nullable,
        });
    }

    for m2m in &metadata.many_to_many {
        steps.push(DeleteStep::DeleteJunctionRows {
            junction_table: m2m.junction_table.clone(),
            column: m2m.junction_column.clone(),
        });
    }

    let mut composition_steps = Vec::new();
    let mut aggregation_steps = Vec::new();
    for child in &metadata.referenced_by {
        let kind = RelationshipKind::from(run.index.classify(&child.table, &table));
        edges.push(RelationshipEdge {
            parent_table: table.clone(),
            child_table: child.table.clone(),
            columns: vec![child.column.clone()],
            kind,
            nullable: child.nullable,
        });
        match kind {
            RelationshipKind::Composition => {
                let routine = run.require(&child.table, discovered)?;
                composition_steps.push(DeleteStep::DeleteChildren {
                    table: child.table.clone(),
                    column: child.column.clone(),
                    routine,
                });
            }
            RelationshipKind::Aggregation if child.nullable => {
                aggregation_steps.push(DeleteStep::UnlinkChildren {
                    table: child.table.clone(),
                    column: child.column.clone(),
                });
            }
            RelationshipKind::Aggregation => {
                // NOT NULL の参照は解除できないため、子ごと削除する
                let routine = run.require(&child.table, discovered)?;
                aggregation_steps.push(DeleteStep::DeleteChildren {
                    table: child.table.clone(),
                    column: child.column.clone(),
                    routine,
                });
            }
            RelationshipKind::Association | RelationshipKind::SelfReference => {
                debug!(
                    parent = %table,
                    child = %child.table,
                    column = %child.column,
                    "association edge is not traversed"
                );
            }
        }
    }
    steps.extend(composition_steps);
    steps.extend(aggregation_steps);
    steps.push(DeleteStep::DeleteOwnRow);

    if let Some(parent) = &metadata.parent {
        let routine = run.require(&parent.parent_table, discovered)?;
        steps.push(DeleteStep::DeleteParentRow {
            table: parent.parent_table.clone(),
            routine,
        });
    }

    let node = TableNode {
        table,
        is_root,
        edges,
        self_references: metadata.self_references.clone(),
        many_to_many: metadata.many_to_many.clone(),
        parent: metadata.parent.clone(),
    };
    Ok((node, steps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DatabaseDialect;
    use crate::error::DeleteError;
    use crate::schema::InMemorySchema;

    struct NameOnlyRenderer;

    impl RoutineRenderer for NameOnlyRenderer {
        fn dialect(&self) -> DatabaseDialect {
            DatabaseDialect::Postgis
        }

        fn declaration(&self, routine: &DeleteRoutine) -> String {
            format!("{}(pid)", routine.name)
        }

        fn definition(&self, routine: &DeleteRoutine) -> String {
            format!("{} steps", routine.steps.len())
        }
    }

    async fn synthesize(schema: &InMemorySchema) -> Result<RoutineRegistry> {
        DeleteRoutineSynthesizer::new("citydb", SynthesisOptions::default())
            .synthesize(schema, schema, &NameOnlyRenderer)
            .await
    }

    #[tokio::test]
    async fn test_root_only_schema() {
        let schema = InMemorySchema::new().table("cityobject");
        let registry = synthesize(&schema).await.unwrap();
        assert_eq!(registry.len(), 1);
        let root = registry.root().unwrap();
        assert!(root.node.is_root);
        assert_eq!(root.steps, vec![DeleteStep::DeleteOwnRow]);
        assert_eq!(root.declaration, "del_cityobject(pid)");
    }

    #[tokio::test]
    async fn test_composition_before_aggregation_and_own_row() {
        let schema = InMemorySchema::new()
            .table("cityobject")
            .foreign_key("appearance", "cityobject_id", "cityobject", true)
            .foreign_key("generic_attrib", "cityobject_id", "cityobject", false)
            .aggregation("appearance", "cityobject", false)
            .aggregation("generic_attrib", "cityobject", true);

        let registry = synthesize(&schema).await.unwrap();
        let root = registry.get("cityobject").unwrap();
        assert_eq!(
            root.steps,
            vec![
                DeleteStep::DeleteChildren {
                    table: "generic_attrib".to_string(),
                    column: "cityobject_id".to_string(),
                    routine: "del_generic_attrib".to_string(),
                },
                DeleteStep::UnlinkChildren {
                    table: "appearance".to_string(),
                    column: "cityobject_id".to_string(),
                },
                DeleteStep::DeleteOwnRow,
            ]
        );
        // 参照解除だけの子にはルーチンを作らない
        assert!(!registry.contains("appearance"));
    }

    #[tokio::test]
    async fn test_not_null_aggregation_deletes_child() {
        let schema = InMemorySchema::new()
            .table("cityobject")
            .foreign_key("external_reference", "cityobject_id", "cityobject", false)
            .aggregation("external_reference", "cityobject", false);

        let registry = synthesize(&schema).await.unwrap();
        assert!(registry.contains("external_reference"));
        let root = registry.get("cityobject").unwrap();
        assert_eq!(root.callees(), vec!["del_external_reference"]);
    }

    #[tokio::test]
    async fn test_structural_parent_is_chained_after_own_row() {
        let schema = InMemorySchema::new()
            .table("cityobject")
            .foreign_key("surface", "cityobject_id", "cityobject", false)
            .foreign_key("surface", "id", "feature", false)
            .table("feature")
            .aggregation("surface", "cityobject", true);

        let registry = synthesize(&schema).await.unwrap();
        let surface = registry.get("surface").unwrap();
        assert_eq!(
            surface.steps,
            vec![
                DeleteStep::DeleteOwnRow,
                DeleteStep::DeleteParentRow {
                    table: "feature".to_string(),
                    routine: "del_feature".to_string(),
                },
            ]
        );
        assert!(registry.contains("feature"));
        assert!(registry.is_complete());
    }

    #[tokio::test]
    async fn test_mutual_composition_terminates() {
        let schema = InMemorySchema::new()
            .table("cityobject")
            .foreign_key("a", "cityobject_id", "cityobject", false)
            .foreign_key("a", "b_id", "b", true)
            .foreign_key("b", "a_id", "a", true)
            .aggregation("a", "cityobject", true)
            .aggregation("a", "b", true)
            .aggregation("b", "a", true);

        let registry = synthesize(&schema).await.unwrap();
        assert_eq!(registry.tables(), &["cityobject", "a", "b"]);
        assert!(registry.is_complete());
        assert_eq!(registry.get("a").unwrap().callees(), vec!["del_b"]);
        assert_eq!(registry.get("b").unwrap().callees(), vec!["del_a"]);
    }

    #[tokio::test]
    async fn test_introspection_failure_aborts_run() {
        let schema = InMemorySchema::new()
            .table("cityobject")
            .foreign_key("building", "cityobject_id", "cityobject", false)
            .aggregation("building", "cityobject", true)
            .fail_on("building");

        let err = synthesize(&schema).await.unwrap_err();
        assert!(matches!(
            err,
            DeleteError::SchemaIntrospection { ref table, .. } if table == "building"
        ));
    }

    #[test]
    fn test_options_builder() {
        let options = SynthesisOptions::new()
            .root_table("feature")
            .routine_prefix("purge_")
            .id_column("fid");
        assert_eq!(options.root_table, "feature");
        assert_eq!(options.routine_prefix, "purge_");
        assert_eq!(options.id_column, "fid");
    }
}
