//! Database migrations, sample catalog data, and the built-in knowledge
//! corpus.
//!
//! Everything here is idempotent: `run_migrations` uses `IF NOT EXISTS`,
//! `seed_catalog` uses `INSERT OR IGNORE`, and the corpus is loaded into
//! the in-memory index at startup (re-running replaces same-id documents).

use anyhow::Result;
use sqlx::sqlite::SqlitePool;

use crate::models::KnowledgeDocument;

/// Create the catalog tables and the learned-query table.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS aplicacion (
            id INTEGER PRIMARY KEY,
            nombre TEXT NOT NULL,
            descripcion TEXT,
            equipo_responsable TEXT,
            estado TEXT NOT NULL,
            fecha_creacion TEXT
        )",
        "CREATE TABLE IF NOT EXISTS elemento_promocionable (
            id INTEGER PRIMARY KEY,
            nombre TEXT NOT NULL,
            descripcion TEXT,
            tipo TEXT,
            url_demo TEXT,
            aplicacion_id INTEGER REFERENCES aplicacion(id)
        )",
        "CREATE TABLE IF NOT EXISTS itinerario_qa (
            id INTEGER PRIMARY KEY,
            nombre TEXT NOT NULL,
            fecha_inicio TEXT,
            fecha_fin TEXT,
            estado TEXT NOT NULL,
            elemento_promocionable_id INTEGER REFERENCES elemento_promocionable(id)
        )",
        "CREATE TABLE IF NOT EXISTS actividad_qa (
            id INTEGER PRIMARY KEY,
            nombre TEXT NOT NULL,
            descripcion TEXT,
            tipo TEXT,
            porcentaje_completado INTEGER,
            fecha_estimada TEXT,
            estado TEXT NOT NULL,
            itinerario_id INTEGER REFERENCES itinerario_qa(id)
        )",
        "CREATE TABLE IF NOT EXISTS learned_queries (
            question TEXT PRIMARY KEY,
            generated_sql TEXT NOT NULL,
            intent TEXT NOT NULL,
            result_count INTEGER NOT NULL,
            usage_count INTEGER NOT NULL,
            last_used INTEGER NOT NULL
        )",
    ];

    for sql in statements {
        sqlx::query(sql).execute(pool).await?;
    }

    Ok(())
}

/// Populate the catalog with the demo dataset.
pub async fn seed_catalog(pool: &SqlitePool) -> Result<()> {
    let statements = [
        "INSERT OR IGNORE INTO aplicacion (id, nombre, descripcion, equipo_responsable, estado, fecha_creacion) VALUES
            (1, 'BancaMovil', 'Aplicación móvil de banca personal', 'Equipo Movilidad', 'ACTIVA', '2024-01-15'),
            (2, 'PortalWeb', 'Portal web transaccional para clientes', 'Equipo Canales', 'ACTIVA', '2024-02-20'),
            (3, 'CoreBanking', 'Núcleo bancario y contabilidad', 'Equipo Core', 'EN_DESARROLLO', '2024-03-10'),
            (4, 'PagosInstant', 'Motor de pagos instantáneos', 'Equipo Pagos', 'ACTIVA', '2024-05-02')",
        "INSERT OR IGNORE INTO elemento_promocionable (id, nombre, descripcion, tipo, url_demo, aplicacion_id) VALUES
            (1, 'LoginBiometrico', 'Autenticación con huella y rostro', 'FEATURE', 'https://demo.local/login', 1),
            (2, 'DashboardAnalitico', 'Panel de métricas de uso', 'FEATURE', 'https://demo.local/dashboard', 2),
            (3, 'ReembolsosExpres', 'Flujo de devoluciones aceleradas', 'FEATURE', NULL, 4),
            (4, 'MotorContable', 'Asientos contables en tiempo real', 'SERVICIO', NULL, 3)",
        "INSERT OR IGNORE INTO itinerario_qa (id, nombre, fecha_inicio, fecha_fin, estado, elemento_promocionable_id) VALUES
            (1, 'Itinerario LoginBiometrico', '2025-05-01', '2025-07-30', 'ACTIVO', 1),
            (2, 'Itinerario Dashboard', '2025-04-15', '2025-06-30', 'ACTIVO', 2),
            (3, 'Itinerario Reembolsos', '2025-03-01', '2025-04-30', 'COMPLETADO', 3),
            (4, 'Itinerario MotorContable', '2025-08-01', NULL, 'PLANIFICADO', 4)",
        "INSERT OR IGNORE INTO actividad_qa (id, nombre, descripcion, tipo, porcentaje_completado, fecha_estimada, estado, itinerario_id) VALUES
            (1, 'Pruebas funcionales login', 'Casos felices y de error de autenticación', 'FUNCIONAL', 90, '2025-06-15', 'EN_PROGRESO', 1),
            (2, 'Pruebas de seguridad login', 'Pentesting del flujo biométrico', 'SEGURIDAD', 60, '2025-07-01', 'EN_PROGRESO', 1),
            (3, 'Pruebas de rendimiento login', 'Carga de 500 usuarios concurrentes', 'RENDIMIENTO', 0, '2025-07-20', 'PENDIENTE', 1),
            (4, 'Pruebas funcionales dashboard', 'Validación de widgets y filtros', 'FUNCIONAL', 100, '2025-05-30', 'COMPLETADA', 2),
            (5, 'Pruebas de accesibilidad dashboard', 'WCAG 2.1 AA', 'ACCESIBILIDAD', 45, '2025-06-20', 'EN_PROGRESO', 2),
            (6, 'Regresión reembolsos', 'Suite completa de regresión', 'REGRESION', 100, '2025-04-25', 'COMPLETADA', 3),
            (7, 'Pruebas de integración contable', 'Conciliación con el ledger', 'INTEGRACION', 0, '2025-09-15', 'PENDIENTE', 4)",
    ];

    for sql in statements {
        sqlx::query(sql).execute(pool).await?;
    }

    Ok(())
}

/// The built-in knowledge corpus loaded into the document index at
/// startup. Content mirrors the catalog's operating documentation.
pub fn knowledge_corpus() -> Vec<KnowledgeDocument> {
    vec![
        KnowledgeDocument::new(
            "modelo-datos-001",
            "Modelo de Datos - Catálogo QA",
            "MODELO DE DATOS - CATÁLOGO QA\n\n\
             ENTIDADES PRINCIPALES:\n\
             - aplicacion(id, nombre, descripcion, equipo_responsable, estado, fecha_creacion)\n\
             - elemento_promocionable(id, nombre, descripcion, tipo, url_demo, aplicacion_id)\n\
             - itinerario_qa(id, nombre, fecha_inicio, fecha_fin, estado, elemento_promocionable_id)\n\
             - actividad_qa(id, nombre, descripcion, tipo, porcentaje_completado, fecha_estimada, estado, itinerario_id)\n\n\
             RELACIONES:\n\
             - aplicacion 1:N elemento_promocionable\n\
             - elemento_promocionable 1:N itinerario_qa (solo uno ACTIVO a la vez)\n\
             - itinerario_qa 1:N actividad_qa",
        )
        .with_metadata("tipo", "esquema")
        .with_metadata("categoria", "modelo_datos")
        .with_metadata("prioridad", "alta"),
        KnowledgeDocument::new(
            "proceso-qa-002",
            "Proceso de Calidad - Ciclo de Vida",
            "PROCESO DE CALIDAD\n\n\
             Cada elemento promocionable atraviesa un itinerario de QA antes de\n\
             promocionarse a producción. Un itinerario agrupa actividades de\n\
             distinto tipo (funcional, seguridad, rendimiento, accesibilidad,\n\
             regresión, integración) y se considera completo cuando todas sus\n\
             actividades alcanzan el 100% o se cancelan justificadamente.\n\n\
             Los estados de un itinerario son PLANIFICADO, ACTIVO, COMPLETADO y\n\
             CANCELADO. Solo puede existir un itinerario ACTIVO por elemento\n\
             promocionable.",
        )
        .with_metadata("tipo", "proceso")
        .with_metadata("categoria", "operacional"),
        KnowledgeDocument::new(
            "tipos-actividad-003",
            "Tipos de Actividad QA",
            "TIPOS DE ACTIVIDAD\n\n\
             - FUNCIONAL: validación de casos de uso y reglas de negocio.\n\
             - SEGURIDAD: pentesting, revisión de dependencias y cifrado.\n\
             - RENDIMIENTO: pruebas de carga, estrés y volumen.\n\
             - ACCESIBILIDAD: conformidad WCAG 2.1 nivel AA.\n\
             - REGRESION: re-ejecución de suites existentes tras cambios.\n\
             - INTEGRACION: verificación de contratos entre sistemas.\n\n\
             Cada actividad registra un porcentaje_completado de 0 a 100 y un\n\
             estado (PENDIENTE, EN_PROGRESO, COMPLETADA, BLOQUEADA, CANCELADA).",
        )
        .with_metadata("tipo", "taxonomia")
        .with_metadata("categoria", "actividades"),
        KnowledgeDocument::new(
            "criterios-promocion-004",
            "Criterios de Promoción a Producción",
            "CRITERIOS DE PROMOCIÓN\n\n\
             Un elemento promocionable puede pasar a producción cuando:\n\
             1. Su itinerario ACTIVO está COMPLETADO.\n\
             2. La cobertura promedio de actividades supera el 80%.\n\
             3. Ninguna actividad de SEGURIDAD quedó BLOQUEADA o CANCELADA.\n\
             4. El equipo responsable firma la evidencia de pruebas.\n\n\
             El ranking de cobertura por aplicación se calcula como el promedio\n\
             de porcentaje_completado de las actividades de sus itinerarios\n\
             activos.",
        )
        .with_metadata("tipo", "politica")
        .with_metadata("categoria", "promocion")
        .with_metadata("prioridad", "alta"),
        KnowledgeDocument::new(
            "flujos-trabajo-005",
            "Flujos de Trabajo QA - Escenarios Comunes",
            "FLUJOS DE TRABAJO\n\n\
             Escenario 1 — alta de una aplicación: se registra la aplicación,\n\
             sus elementos promocionables y se planifica el primer itinerario.\n\n\
             Escenario 2 — seguimiento semanal: los equipos revisan el avance de\n\
             las actividades EN_PROGRESO y desbloquean las BLOQUEADAS.\n\n\
             Escenario 3 — cierre de itinerario: con todas las actividades\n\
             COMPLETADAS se marca el itinerario como COMPLETADO y se archiva la\n\
             evidencia.",
        )
        .with_metadata("tipo", "flujos_trabajo")
        .with_metadata("categoria", "operacional"),
        KnowledgeDocument::new(
            "ejemplos-qa-006",
            "Ejemplos de Preguntas y Respuestas",
            "EJEMPLOS DE USO\n\n\
             - \"cuántas aplicaciones hay\" consulta el total de la tabla\n\
               aplicacion.\n\
             - \"ranking de cobertura\" ordena las aplicaciones por el promedio\n\
               de porcentaje_completado de sus actividades activas.\n\
             - \"qué actividades tiene el itinerario LoginBiometrico\" lista las\n\
               actividades de ese itinerario con su avance.\n\
             - \"qué es un itinerario de QA\" se responde desde esta base de\n\
               conocimiento, sin consultar el catálogo.",
        )
        .with_metadata("tipo", "ejemplos_qa")
        .with_metadata("categoria", "entrenamiento"),
    ]
}
