use crate::dialect::DatabaseDialect;
use crate::emit::script::DeleteScript;
use crate::emit::{ensure_emittable, indent, RoutineRenderer, ScriptEmitter};
use crate::error::Result;
use crate::session::RoutineCall;
use crate::synth::{DeleteRoutine, DeleteStep, RoutineRegistry};

/// PostgisEmitter はルーチンごとに独立した PL/pgSQL 関数を生成する。
/// 関数同士はスキーマ修飾名で直接呼び合う。
#[derive(Debug, Clone, Default)]
pub struct PostgisEmitter;

impl PostgisEmitter {
    pub fn new() -> Self {
        Self
    }

    fn render_step(routine: &DeleteRoutine, step: &DeleteStep) -> String {
        let schema = &routine.schema;
        let id = &routine.id_column;
        let table = &routine.table;
        match step {
            DeleteStep::DeleteSelfReferencing { column } => format!(
                "FOR rec IN SELECT {id} FROM {schema}.{table} WHERE {column} = pid AND {id} <> pid LOOP\n\
                 \x20 PERFORM {schema}.{name}(rec.{id});\n\
                 END LOOP;",
                name = routine.name
            ),
            DeleteStep::NullifySelfReference { column } => {
                format!("UPDATE {schema}.{table} SET {column} = NULL WHERE {column} = pid;")
            }
            DeleteStep::DeleteJunctionRows {
                junction_table,
                column,
            } => format!("DELETE FROM {schema}.{junction_table} WHERE {column} = pid;"),
            DeleteStep::DeleteChildren {
                table: child,
                column,
                routine: callee,
            } => format!(
                "FOR rec IN SELECT {id} FROM {schema}.{child} WHERE {column} = pid LOOP\n\
                 \x20 PERFORM {schema}.{callee}(rec.{id});\n\
                 END LOOP;"
            ),
            DeleteStep::UnlinkChildren {
                table: child,
                column,
            } => format!("UPDATE {schema}.{child} SET {column} = NULL WHERE {column} = pid;"),
            DeleteStep::DeleteOwnRow => format!(
                "DELETE FROM {schema}.{table} WHERE {id} = pid RETURNING {id} INTO deleted_id;"
            ),
            DeleteStep::DeleteParentRow {
                routine: callee, ..
            } => format!(
                "IF deleted_id IS NOT NULL THEN\n\
                 \x20 PERFORM {schema}.{callee}(deleted_id);\n\
                 END IF;"
            ),
        }
    }
}

impl RoutineRenderer for PostgisEmitter {
    fn dialect(&self) -> DatabaseDialect {
        DatabaseDialect::Postgis
    }

    fn declaration(&self, routine: &DeleteRoutine) -> String {
        format!("{}.{}(pid bigint) RETURNS bigint", routine.schema, routine.name)
    }

    fn definition(&self, routine: &DeleteRoutine) -> String {
        let body = routine
            .steps
            .iter()
            .map(|step| Self::render_step(routine, step))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "CREATE OR REPLACE FUNCTION {declaration} AS\n\
             $body$\n\
             DECLARE\n\
             \x20 deleted_id bigint;\n\
             \x20 rec RECORD;\n\
             BEGIN\n\
             {body}\n\
             \x20 RETURN deleted_id;\n\
             END;\n\
             $body$\n\
             LANGUAGE plpgsql STRICT;",
            declaration = self.declaration(routine),
            body = indent(&body, 2)
        )
    }
}

impl ScriptEmitter for PostgisEmitter {
    fn emit(&self, registry: &RoutineRegistry) -> Result<DeleteScript> {
        ensure_emittable(registry)?;
        let statements = registry.routines().map(|r| r.definition.clone()).collect();
        let routines = registry.routines().map(|r| r.name.clone()).collect();
        Ok(DeleteScript::new(DatabaseDialect::Postgis, routines, statements))
    }

    fn routine_call(&self, schema: &str, routine: &str) -> RoutineCall {
        RoutineCall {
            routine: routine.to_string(),
            sql: format!("SELECT {schema}.{routine}($1)"),
        }
    }
}
