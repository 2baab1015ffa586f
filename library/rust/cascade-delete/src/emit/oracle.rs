use crate::dialect::DatabaseDialect;
use crate::emit::script::{DeleteScript, PACKAGE_BODY_DELIMITER};
use crate::emit::{ensure_emittable, indent, RoutineRenderer, ScriptEmitter, ScriptOptions};
use crate::error::Result;
use crate::session::RoutineCall;
use crate::synth::{DeleteRoutine, DeleteStep, RoutineRegistry};

/// OracleEmitter は全ルーチンを 1 つのパッケージ（ヘッダーと本体）にまとめる。
#[derive(Debug, Clone)]
pub struct OracleEmitter {
    package_name: String,
}

impl OracleEmitter {
    pub fn new(options: &ScriptOptions) -> Self {
        Self {
            package_name: options.package_name.to_ascii_lowercase(),
        }
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    fn render_step(routine: &DeleteRoutine, step: &DeleteStep) -> String {
        let id = &routine.id_column;
        let table = &routine.table;
        match step {
            DeleteStep::DeleteSelfReferencing { column } => format!(
                "FOR rec IN (SELECT {id} FROM {table} WHERE {column} = pid AND {id} <> pid) LOOP\n\
                 \x20 dummy_id := {name}(rec.{id});\n\
                 END LOOP;",
                name = routine.name
            ),
            DeleteStep::NullifySelfReference { column } => {
                format!("UPDATE {table} SET {column} = NULL WHERE {column} = pid;")
            }
            DeleteStep::DeleteJunctionRows {
                junction_table,
                column,
            } => format!("DELETE FROM {junction_table} WHERE {column} = pid;"),
            DeleteStep::DeleteChildren {
                table: child,
                column,
                routine: callee,
            } => format!(
                "FOR rec IN (SELECT {id} FROM {child} WHERE {column} = pid) LOOP\n\
                 \x20 dummy_id := {callee}(rec.{id});\n\
                 END LOOP;"
            ),
            DeleteStep::UnlinkChildren {
                table: child,
                column,
            } => format!("UPDATE {child} SET {column} = NULL WHERE {column} = pid;"),
            DeleteStep::DeleteOwnRow => {
                format!("DELETE FROM {table} WHERE {id} = pid RETURNING {id} INTO deleted_id;")
            }
            DeleteStep::DeleteParentRow {
                routine: callee, ..
            } => format!(
                "IF deleted_id IS NOT NULL THEN\n\
                 \x20 dummy_id := {callee}(deleted_id);\n\
                 END IF;"
            ),
        }
    }
}

impl RoutineRenderer for OracleEmitter {
    fn dialect(&self) -> DatabaseDialect {
        DatabaseDialect::Oracle
    }

    fn declaration(&self, routine: &DeleteRoutine) -> String {
        format!("FUNCTION {}(pid NUMBER) RETURN NUMBER;", routine.name)
    }

    fn definition(&self, routine: &DeleteRoutine) -> String {
        let body = routine
            .steps
            .iter()
            .map(|step| Self::render_step(routine, step))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "FUNCTION {name}(pid NUMBER) RETURN NUMBER\n\
             IS\n\
             \x20 deleted_id NUMBER;\n\
             \x20 dummy_id NUMBER;\n\
             BEGIN\n\
             {body}\n\
             \x20 RETURN deleted_id;\n\
             END {name};",
            name = routine.name,
            body = indent(&body, 2)
        )
    }
}

impl ScriptEmitter for OracleEmitter {
    fn emit(&self, registry: &RoutineRegistry) -> Result<DeleteScript> {
        ensure_emittable(registry)?;
        let package = &self.package_name;

        let declarations = registry
            .routines()
            .map(|r| indent(&r.declaration, 2))
            .collect::<Vec<_>>()
            .join("\n");
        let definitions = registry
            .routines()
            .map(|r| indent(&r.definition, 2))
            .collect::<Vec<_>>()
            .join("\n\n");

        let header = format!("CREATE OR REPLACE PACKAGE {package}\nAS\n{declarations}\nEND {package};");
        let body = format!("CREATE OR REPLACE PACKAGE BODY {package}\nAS\n{definitions}\nEND {package};");
        let statement = format!("{header}\n{PACKAGE_BODY_DELIMITER}\n{body}");

        let routines = registry.routines().map(|r| r.name.clone()).collect();
        Ok(DeleteScript::new(DatabaseDialect::Oracle, routines, vec![statement]))
    }

    fn routine_call(&self, _schema: &str, routine: &str) -> RoutineCall {
        RoutineCall {
            routine: routine.to_string(),
            sql: format!("BEGIN :1 := {}.{}(:2); END;", self.package_name, routine),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::TableNode;

    fn routine(steps: Vec<DeleteStep>) -> DeleteRoutine {
        DeleteRoutine {
            table: "building".to_string(),
            name: "del_building".to_string(),
            schema: "citydb".to_string(),
            id_column: "id".to_string(),
            node: TableNode {
                table: "building".to_string(),
                is_root: false,
                edges: vec![],
                self_references: vec![],
                many_to_many: vec![],
                parent: None,
            },
            steps,
            declaration: String::new(),
            definition: String::new(),
        }
    }

    #[test]
    fn test_definition_renders_steps_in_order() {
        let emitter = OracleEmitter::new(&ScriptOptions::default());
        let definition = emitter.definition(&routine(vec![
            DeleteStep::NullifySelfReference {
                column: "building_parent_id".to_string(),
            },
            DeleteStep::DeleteChildren {
                table: "thematic_surface".to_string(),
                column: "building_id".to_string(),
                routine: "del_thematic_surface".to_string(),
            },
            DeleteStep::DeleteOwnRow,
            DeleteStep::DeleteParentRow {
                table: "cityobject".to_string(),
                routine: "del_cityobject".to_string(),
            },
        ]));

        assert!(definition.starts_with("FUNCTION del_building(pid NUMBER) RETURN NUMBER\nIS\n"));
        let nullify = definition
            .find("UPDATE building SET building_parent_id = NULL WHERE building_parent_id = pid;")
            .unwrap();
        let children = definition
            .find("dummy_id := del_thematic_surface(rec.id);")
            .unwrap();
        let own = definition
            .find("DELETE FROM building WHERE id = pid RETURNING id INTO deleted_id;")
            .unwrap();
        let parent = definition.find("dummy_id := del_cityobject(deleted_id);").unwrap();
        assert!(nullify < children && children < own && own < parent);
        assert!(definition.ends_with("  RETURN deleted_id;\nEND del_building;"));
    }

    #[test]
    fn test_self_referencing_rows_call_own_routine() {
        let emitter = OracleEmitter::new(&ScriptOptions::default());
        let definition = emitter.definition(&routine(vec![DeleteStep::DeleteSelfReferencing {
            column: "building_root_id".to_string(),
        }]));
        assert!(definition.contains(
            "FOR rec IN (SELECT id FROM building WHERE building_root_id = pid AND id <> pid) LOOP"
        ));
        assert!(definition.contains("    dummy_id := del_building(rec.id);"));
    }

    #[test]
    fn test_routine_call_uses_package() {
        let emitter = OracleEmitter::new(&ScriptOptions::default().package_name("CITYDB_PKG"));
        let call = emitter.routine_call("citydb", "del_cityobject");
        assert_eq!(call.sql, "BEGIN :1 := citydb_pkg.del_cityobject(:2); END;");
        assert_eq!(call.routine, "del_cityobject");
    }
}
