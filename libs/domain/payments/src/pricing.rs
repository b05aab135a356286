// [libs/domain/payments/src/pricing.rs]
/*!
 * =================================================================
 * APARATO: MARGIN RULE TABLE (V3.0 - GLOB SEALED)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: RESOLUCIÓN ORDENADA DE MÁRGENES POR PROVEEDOR/MODELO
 *
 * # Logic:
 * La tabla es una lista ordenada de reglas (provider, glob, multiplier).
 * El glob trata '*' como comodín de cualquier longitud y todo lo demás
 * como literal. La primera regla que calza gana; sin calce se aplica el
 * margen por defecto del despliegue.
 * =================================================================
 */

use hive_core_credits::{CreditError, MarginMultiplier};
use serde::{Deserialize, Serialize};

/// Regla individual de margen sobre el costo mayorista.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginRule {
    /// Proveedor externo (calce exacto).
    pub provider: String,
    /// Patrón del modelo con '*' como comodín ("gpt-4*", "*").
    pub model_glob: String,
    /// Multiplicador validado en [1.0, 3.0] al cargar la configuración.
    pub multiplier: MarginMultiplier,
}

/// Tabla ordenada de reglas con fallback por defecto.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginTable {
    rules: Vec<MarginRule>,
    default_margin: MarginMultiplier,
}

impl MarginTable {
    #[must_use]
    pub fn new(rules: Vec<MarginRule>, default_margin: MarginMultiplier) -> Self {
        Self { rules, default_margin }
    }

    /**
     * Construye la tabla desde literales de configuración
     * ("provider:glob:multiplier"), rechazando márgenes fuera de rango
     * en el momento de la carga.
     *
     * # Errors:
     * - `CreditError::MarginOutOfBounds` / `MalformedDecimal`: un literal
     *   de multiplicador inválido aborta la carga completa.
     */
    pub fn from_config_literals(
        rule_literals: &[String],
        default_margin_literal: &str,
    ) -> Result<Self, CreditError> {
        let default_margin = MarginMultiplier::parse(default_margin_literal)?;

        let mut rules = Vec::with_capacity(rule_literals.len());
        for rule_literal in rule_literals {
            let mut segments = rule_literal.splitn(3, ':');
            let provider = segments.next().unwrap_or("").trim();
            let model_glob = segments.next().unwrap_or("*").trim();
            let multiplier_literal = segments.next().unwrap_or("").trim();

            if provider.is_empty() || multiplier_literal.is_empty() {
                return Err(CreditError::MalformedDecimal(rule_literal.clone()));
            }

            rules.push(MarginRule {
                provider: provider.to_string(),
                model_glob: model_glob.to_string(),
                multiplier: MarginMultiplier::parse(multiplier_literal)?,
            });
        }

        Ok(Self { rules, default_margin })
    }

    /// Margen por defecto del despliegue.
    #[must_use]
    pub fn default_margin(&self) -> MarginMultiplier {
        self.default_margin
    }

    /**
     * Resuelve el margen para una llamada (provider, model).
     * Primera regla calzante en orden de declaración; fallback al defecto.
     */
    #[must_use]
    pub fn resolve(&self, provider: &str, model: &str) -> MarginMultiplier {
        self.rules
            .iter()
            .find(|rule| rule.provider == provider && glob_matches(&rule.model_glob, model))
            .map(|rule| rule.multiplier)
            .unwrap_or(self.default_margin)
    }
}

/**
 * Calce de glob: '*' absorbe cualquier secuencia, el resto es literal.
 *
 * # Mathematical Proof (Greedy Segment Scan):
 * Sea el patrón p = s0 * s1 * ... * sn. El candidato calza sii comienza
 * con s0, termina con sn y contiene s1..s(n-1) en orden sin solape. El
 * escaneo codicioso de segmentos es correcto porque los comodines son de
 * longitud arbitraria.
 */
fn glob_matches(pattern: &str, candidate: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == candidate;
    }

    let segments: Vec<&str> = pattern.split('*').collect();
    let mut remainder = candidate;

    // Primer segmento: anclado al inicio.
    let first_segment = segments[0];
    if !remainder.starts_with(first_segment) {
        return false;
    }
    remainder = &remainder[first_segment.len()..];

    // Último segmento: anclado al final.
    let last_segment = segments[segments.len() - 1];
    if segments.len() > 1 {
        if remainder.len() < last_segment.len() || !remainder.ends_with(last_segment) {
            return false;
        }
    }

    // Segmentos intermedios: en orden, sin solape, antes del ancla final.
    let tail_boundary = remainder.len() - last_segment.len();
    let mut middle_window = &remainder[..tail_boundary];
    for middle_segment in &segments[1..segments.len() - 1] {
        match middle_window.find(middle_segment) {
            Some(match_offset) => {
                middle_window = &middle_window[match_offset + middle_segment.len()..];
            }
            None => return false,
        }
    }

    true
}
