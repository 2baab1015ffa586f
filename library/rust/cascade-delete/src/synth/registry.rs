use std::collections::HashMap;

use crate::synth::plan::DeleteRoutine;

/// 登録枠の状態。名前だけ予約された状態から本体の完成へ一方向に遷移する。
#[derive(Debug, Clone)]
enum Slot {
    Reserved { name: String },
    Complete(Box<DeleteRoutine>),
}

impl Slot {
    fn name(&self) -> &str {
        match self {
            Self::Reserved { name } => name,
            Self::Complete(routine) => &routine.name,
        }
    }
}

/// RoutineInventoryEntry は生成済みルーチンの一覧表示用エントリ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineInventoryEntry {
    pub table: String,
    pub name: String,
    pub declaration: String,
}

/// RoutineRegistry はテーブル名をキーとする削除ルーチンの登録簿。
/// 1 テーブルにつきルーチンは高々 1 つで、再登録は何もしない。
#[derive(Debug, Clone, Default)]
pub struct RoutineRegistry {
    order: Vec<String>,
    slots: HashMap<String, Slot>,
}

impl RoutineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// テーブルの名前を予約する。新規に予約した場合のみ true を返す。
    pub fn reserve(&mut self, table: &str, name: &str) -> bool {
        let table = table.to_ascii_lowercase();
        if self.slots.contains_key(&table) {
            return false;
        }
        self.order.push(table.clone());
        self.slots.insert(
            table,
            Slot::Reserved {
                name: name.to_string(),
            },
        );
        true
    }

    /// 予約済みの枠を完成したルーチンで埋める。完成済みの枠は上書きしない。
    pub fn complete(&mut self, routine: DeleteRoutine) {
        let table = routine.table.to_ascii_lowercase();
        match self.slots.get(&table) {
            Some(Slot::Complete(_)) => {}
            Some(Slot::Reserved { .. }) => {
                self.slots.insert(table, Slot::Complete(Box::new(routine)));
            }
            None => {
                self.order.push(table.clone());
                self.slots.insert(table, Slot::Complete(Box::new(routine)));
            }
        }
    }

    pub fn contains(&self, table: &str) -> bool {
        self.slots.contains_key(&table.to_ascii_lowercase())
    }

    pub fn is_pending(&self, table: &str) -> bool {
        matches!(
            self.slots.get(&table.to_ascii_lowercase()),
            Some(Slot::Reserved { .. })
        )
    }

    /// 予約済み・完成済みを問わずルーチン名を返す。
    pub fn name_of(&self, table: &str) -> Option<&str> {
        self.slots.get(&table.to_ascii_lowercase()).map(Slot::name)
    }

    pub fn get(&self, table: &str) -> Option<&DeleteRoutine> {
        match self.slots.get(&table.to_ascii_lowercase()) {
            Some(Slot::Complete(routine)) => Some(&**routine),
            _ => None,
        }
    }

    pub fn get_by_name(&self, name: &str) -> Option<&DeleteRoutine> {
        self.routines().find(|r| r.name.eq_ignore_ascii_case(name))
    }

    /// 完成済みのルーチンを登録順に返す。
    pub fn routines(&self) -> impl Iterator<Item = &DeleteRoutine> {
        self.order.iter().filter_map(|t| match self.slots.get(t) {
            Some(Slot::Complete(routine)) => Some(&**routine),
            _ => None,
        })
    }

    pub fn tables(&self) -> &[String] {
        &self.order
    }

    /// 最初に登録されたルーチン（ルートテーブル）。
    pub fn root(&self) -> Option<&DeleteRoutine> {
        self.order.first().and_then(|t| self.get(t))
    }

    pub fn is_complete(&self) -> bool {
        self.slots.values().all(|s| matches!(s, Slot::Complete(_)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn inventory(&self) -> Vec<RoutineInventoryEntry> {
        self.routines()
            .map(|r| RoutineInventoryEntry {
                table: r.table.clone(),
                name: r.name.clone(),
                declaration: r.declaration.clone(),
            })
            .collect()
    }

    /// 宣言部と定義本体を並べた人間向けの一覧。
    pub fn render_inventory(&self) -> String {
        let mut out = String::new();
        for routine in self.routines() {
            out.push_str(&format!("-- {} ({})\n", routine.name, routine.table));
            out.push_str(routine.declaration.trim_end());
            out.push('\n');
            out.push_str(routine.definition.trim_end());
            out.push_str("\n\n");
        }
        out
    }
}
