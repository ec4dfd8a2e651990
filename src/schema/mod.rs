pub mod ddl;
pub mod types;

pub use ddl::{create_index_statements, create_table_statement, insert_statement, quote_ident};
pub use types::{Column, ColumnKind};

/// The single denormalized table everything is loaded into.
pub const TABLE_NAME: &str = "accidentes_hermosillo";

/// Loaded columns in table order (the `id` surrogate key is implicit).
pub const COLUMNS: &[Column] = &[
    Column::text("cobertura", 50),
    Column::int("id_entidad"),
    Column::int("id_municipio"),
    Column::int("anio"),
    Column::int("mes"),
    Column::int("id_hora"),
    Column::int("id_minuto"),
    Column::int("id_dia"),
    Column::text("diasemana", 20),
    Column::text("urbana", 100),
    Column::text("suburbana", 100),
    Column::text("tipaccid", 100),
    // vehicles involved
    Column::int("automovil"),
    Column::int("campasaj"),
    Column::int("microbus"),
    Column::int("pascamion"),
    Column::int("omnibus"),
    Column::int("tranvia"),
    Column::int("camioneta"),
    Column::int("camion"),
    Column::int("tractor"),
    Column::int("ferrocarri"),
    Column::int("motociclet"),
    Column::int("bicicleta"),
    Column::int("otrovehic"),
    Column::text("causaacci", 200),
    Column::text("caparod", 100),
    Column::text("sexo", 20),
    Column::text("aliento", 20),
    Column::text("cinturon", 20),
    Column::int("id_edad"),
    // casualties: driver, passenger, pedestrian, cyclist, other, unspecified
    Column::int("condmuerto"),
    Column::int("condherido"),
    Column::int("pasamuerto"),
    Column::int("pasaherido"),
    Column::int("peatmuerto"),
    Column::int("peatherido"),
    Column::int("ciclmuerto"),
    Column::int("ciclherido"),
    Column::int("otromuerto"),
    Column::int("otroherido"),
    Column::int("nemuerto"),
    Column::int("neherido"),
    Column::text("clasacc", 50),
    Column::text("estatus", 50),
    // year taken from the source file name
    Column::text("año", 10),
];

/// Secondary indexes as `(index name, column)`.
pub const INDEXES: &[(&str, &str)] = &[
    ("idx_anio", "anio"),
    ("idx_mes", "mes"),
    ("idx_tipaccid", "tipaccid"),
    ("idx_causaacci", "causaacci"),
];

pub fn column(name: &str) -> Option<&'static Column> {
    COLUMNS.iter().find(|c| c.name == name)
}
