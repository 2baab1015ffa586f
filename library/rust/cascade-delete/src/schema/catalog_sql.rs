//! 方言ごとのカタログ問い合わせ SQL。
//! いずれもパラメータ 1 がテーブル名、パラメータ 2 がスキーマ名。

pub(crate) mod postgis {
    pub const SELF_REFERENCES: &str = r#"
SELECT a.attname AS column_name, NOT a.attnotnull AS is_nullable
FROM pg_constraint c
JOIN pg_attribute a ON a.attrelid = c.conrelid AND a.attnum = ANY (c.conkey)
WHERE c.contype = 'f'
  AND c.conrelid = to_regclass(quote_ident($2) || '.' || quote_ident($1))
  AND c.confrelid = c.conrelid
ORDER BY a.attname"#;

    pub const MANY_TO_MANY: &str = r#"
SELECT jt.relname AS junction_table,
       ja.attname AS junction_column,
       rt.relname AS associated_table,
       ra.attname AS associated_column,
       oc.conname AS associated_fk_name
FROM pg_constraint c
JOIN pg_class jt ON jt.oid = c.conrelid
JOIN pg_attribute ja ON ja.attrelid = c.conrelid AND ja.attnum = c.conkey[1]
JOIN pg_constraint pk ON pk.conrelid = c.conrelid AND pk.contype = 'p'
JOIN pg_constraint oc ON oc.conrelid = c.conrelid AND oc.contype = 'f' AND oc.oid <> c.oid
JOIN pg_class rt ON rt.oid = oc.confrelid
JOIN pg_attribute ra ON ra.attrelid = oc.conrelid AND ra.attnum = oc.conkey[1]
WHERE c.contype = 'f'
  AND c.confrelid = to_regclass(quote_ident($2) || '.' || quote_ident($1))
  AND c.conrelid <> c.confrelid
  AND array_length(pk.conkey, 1) = 2
  AND c.conkey[1] = ANY (pk.conkey)
  AND oc.conkey[1] = ANY (pk.conkey)
ORDER BY jt.relname, ja.attname"#;

    pub const PARENT_REFERENCE: &str = r#"
SELECT c.conname AS fk_name, pt.relname AS parent_table
FROM pg_constraint c
JOIN pg_constraint pk ON pk.conrelid = c.conrelid AND pk.contype = 'p' AND pk.conkey = c.conkey
JOIN pg_class pt ON pt.oid = c.confrelid
WHERE c.contype = 'f'
  AND c.conrelid = to_regclass(quote_ident($2) || '.' || quote_ident($1))
  AND c.confrelid <> c.conrelid
ORDER BY c.conname"#;

    pub const REFERENCING_TABLES: &str = r#"
SELECT DISTINCT ct.relname AS table_name, a.attname AS column_name, NOT a.attnotnull AS is_nullable
FROM pg_constraint c
JOIN pg_class ct ON ct.oid = c.conrelid
JOIN pg_namespace n ON n.oid = ct.relnamespace
JOIN pg_attribute a ON a.attrelid = c.conrelid AND a.attnum = ANY (c.conkey)
WHERE c.contype = 'f'
  AND c.confrelid = to_regclass(quote_ident($2) || '.' || quote_ident($1))
  AND c.conrelid <> c.confrelid
  AND n.nspname = $2
  AND NOT EXISTS (
    SELECT 1 FROM pg_constraint pk
    WHERE pk.conrelid = c.conrelid AND pk.contype = 'p' AND pk.conkey = c.conkey
  )
ORDER BY table_name, column_name"#;

    /// スキーマ名は検証済みの識別子を埋め込む。
    pub fn aggregation_info(schema: &str) -> String {
        format!(
            "SELECT c.tablename AS child_table, p.tablename AS parent_table, \
             (a.is_composite = 1) AS is_composite \
             FROM {schema}.aggregation_info a \
             JOIN {schema}.objectclass c ON c.id = a.child_id \
             JOIN {schema}.objectclass p ON p.id = a.parent_id"
        )
    }
}

pub(crate) mod oracle {
    pub const SELF_REFERENCES: &str = r#"
SELECT acc.column_name, CASE atc.nullable WHEN 'Y' THEN 1 ELSE 0 END AS is_nullable
FROM all_constraints ac
JOIN all_cons_columns acc ON acc.owner = ac.owner AND acc.constraint_name = ac.constraint_name
JOIN all_constraints rc ON rc.owner = ac.r_owner AND rc.constraint_name = ac.r_constraint_name
JOIN all_tab_columns atc ON atc.owner = ac.owner AND atc.table_name = ac.table_name
  AND atc.column_name = acc.column_name
WHERE ac.constraint_type = 'R'
  AND ac.table_name = :1
  AND ac.owner = :2
  AND rc.table_name = ac.table_name
ORDER BY acc.column_name"#;

    pub const MANY_TO_MANY: &str = r#"
SELECT ac.table_name AS junction_table,
       acc.column_name AS junction_column,
       orc.table_name AS associated_table,
       occ.column_name AS associated_column,
       oc.constraint_name AS associated_fk_name
FROM all_constraints ac
JOIN all_cons_columns acc ON acc.owner = ac.owner AND acc.constraint_name = ac.constraint_name
JOIN all_constraints rc ON rc.owner = ac.r_owner AND rc.constraint_name = ac.r_constraint_name
JOIN all_constraints oc ON oc.owner = ac.owner AND oc.table_name = ac.table_name
  AND oc.constraint_type = 'R' AND oc.constraint_name <> ac.constraint_name
JOIN all_cons_columns occ ON occ.owner = oc.owner AND occ.constraint_name = oc.constraint_name
JOIN all_constraints orc ON orc.owner = oc.r_owner AND orc.constraint_name = oc.r_constraint_name
JOIN all_constraints pk ON pk.owner = ac.owner AND pk.table_name = ac.table_name
  AND pk.constraint_type = 'P'
WHERE ac.constraint_type = 'R'
  AND rc.table_name = :1
  AND rc.owner = :2
  AND ac.table_name <> rc.table_name
  AND (SELECT COUNT(*) FROM all_cons_columns p
       WHERE p.owner = pk.owner AND p.constraint_name = pk.constraint_name) = 2
  AND EXISTS (SELECT 1 FROM all_cons_columns p
       WHERE p.owner = pk.owner AND p.constraint_name = pk.constraint_name
         AND p.column_name = acc.column_name)
  AND EXISTS (SELECT 1 FROM all_cons_columns p
       WHERE p.owner = pk.owner AND p.constraint_name = pk.constraint_name
         AND p.column_name = occ.column_name)
ORDER BY ac.table_name, acc.column_name"#;

    pub const PARENT_REFERENCE: &str = r#"
SELECT ac.constraint_name AS fk_name, rc.table_name AS parent_table
FROM all_constraints ac
JOIN all_cons_columns acc ON acc.owner = ac.owner AND acc.constraint_name = ac.constraint_name
JOIN all_constraints rc ON rc.owner = ac.r_owner AND rc.constraint_name = ac.r_constraint_name
JOIN all_constraints pk ON pk.owner = ac.owner AND pk.table_name = ac.table_name
  AND pk.constraint_type = 'P'
JOIN all_cons_columns pkc ON pkc.owner = pk.owner AND pkc.constraint_name = pk.constraint_name
  AND pkc.column_name = acc.column_name
WHERE ac.constraint_type = 'R'
  AND ac.table_name = :1
  AND ac.owner = :2
  AND rc.table_name <> ac.table_name
  AND (SELECT COUNT(*) FROM all_cons_columns p
       WHERE p.owner = pk.owner AND p.constraint_name = pk.constraint_name) = 1
ORDER BY ac.constraint_name"#;

    pub const REFERENCING_TABLES: &str = r#"
SELECT DISTINCT ac.table_name, acc.column_name,
       CASE atc.nullable WHEN 'Y' THEN 1 ELSE 0 END AS is_nullable
FROM all_constraints ac
JOIN all_cons_columns acc ON acc.owner = ac.owner AND acc.constraint_name = ac.constraint_name
JOIN all_constraints rc ON rc.owner = ac.r_owner AND rc.constraint_name = ac.r_constraint_name
JOIN all_tab_columns atc ON atc.owner = ac.owner AND atc.table_name = ac.table_name
  AND atc.column_name = acc.column_name
WHERE ac.constraint_type = 'R'
  AND rc.table_name = :1
  AND rc.owner = :2
  AND ac.table_name <> rc.table_name
  AND NOT EXISTS (
    SELECT 1 FROM all_constraints pk
    JOIN all_cons_columns pkc ON pkc.owner = pk.owner AND pkc.constraint_name = pk.constraint_name
    WHERE pk.owner = ac.owner AND pk.table_name = ac.table_name AND pk.constraint_type = 'P'
      AND pkc.column_name = acc.column_name
      AND (SELECT COUNT(*) FROM all_cons_columns p
           WHERE p.owner = pk.owner AND p.constraint_name = pk.constraint_name) = 1
  )
ORDER BY ac.table_name, acc.column_name"#;

    pub fn aggregation_info(schema: &str) -> String {
        format!(
            "SELECT c.tablename AS child_table, p.tablename AS parent_table, a.is_composite \
             FROM {schema}.aggregation_info a \
             JOIN {schema}.objectclass c ON c.id = a.child_id \
             JOIN {schema}.objectclass p ON p.id = a.parent_id"
        )
    }
}
