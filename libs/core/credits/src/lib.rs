// [libs/core/credits/src/lib.rs]
/*!
 * =================================================================
 * APARATO: SOVEREIGN CREDIT ARITHMETIC ENGINE (V5.0 - GOLD MASTER)
 * CLASIFICACIÓN: CORE FINANCE (ESTRATO L1)
 * RESPONSABILIDAD: ARITMÉTICA MONETARIA EXACTA EN UNIDADES NANO-DÓLAR
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ZERO FLOATING POINT: Todo el dinero vive como enteros i64 en
 *    unidades crudas (1 centavo = 10^7 unidades). El punto flotante
 *    está físicamente ausente de este aparato.
 * 2. SINGLE ROUNDING POINT: El único redondeo del sistema ocurre en la
 *    multiplicación de margen, half-away-from-zero, sellado en i128.
 * 3. NOMINAL PURITY: Nomenclatura nominal absoluta (amt -> credit_amount,
 *    bp -> basis_points).
 * 4. HYGIENE: Errores catalogados vía thiserror; sin pánicos en rutas
 *    de producción.
 *
 * # Mathematical Proof (Exactness):
 * Sea R = 10^7 unidades crudas por centavo. Para todo n entero de
 * centavos con |n| <= i64::MAX / R, from_cents(n).to_cents() == n por
 * asociatividad de la multiplicación entera. La suma y la resta son
 * cerradas en Z salvo overflow, el cual se reporta como fallo catalogado
 * en lugar de envenenar el Ledger.
 * =================================================================
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unidades crudas por centavo de dólar (escala nano-dólar).
pub const RAW_UNITS_PER_CENT: i64 = 10_000_000;

/// Unidades crudas por dólar entero.
pub const RAW_UNITS_PER_DOLLAR: i64 = 1_000_000_000;

/// Dígitos fraccionales máximos aceptados al parsear montos decimales.
const MAXIMUM_FRACTIONAL_DIGITS: usize = 9;

/// Escala del multiplicador de margen: 10_000 puntos base = 1.0x.
pub const MARGIN_BASIS_POINTS_SCALE: i64 = 10_000;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CreditError {
    /// El literal decimal no es un monto monetario válido.
    #[error("[L1_CREDIT_FAULT]: DECIMAL_LITERAL_REJECTED -> {0}")]
    MalformedDecimal(String),

    /// La operación aritmética excede el rango del Ledger (±i64 crudo).
    #[error("[L1_CREDIT_FAULT]: ARITHMETIC_RANGE_EXCEEDED")]
    Overflow,

    /// El multiplicador de margen está fuera del rango operativo [1.0, 3.0].
    #[error("[L1_CREDIT_FAULT]: MARGIN_OUT_OF_BOUNDS -> {0}")]
    MarginOutOfBounds(String),
}

/**
 * Monto monetario exacto del plano de control.
 *
 * Internamente un conteo con signo de unidades nano-dólar. Positivo para
 * abonos, negativo para cargos. El cero es un valor distinguido.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreditAmount {
    raw_nano_units: i64,
}

impl CreditAmount {
    /// El monto nulo distinguido.
    pub const ZERO: CreditAmount = CreditAmount { raw_nano_units: 0 };

    /**
     * Construye un monto desde un conteo entero de centavos.
     *
     * # Logic:
     * Multiplicación entera exacta por la escala cruda. Satura el rango
     * extremo (|cents| > 9.2·10^11, ~9 mil millones de dólares) como
     * fallo de overflow en lugar de corromper silenciosamente.
     */
    pub fn from_cents(whole_cents: i64) -> Result<Self, CreditError> {
        whole_cents
            .checked_mul(RAW_UNITS_PER_CENT)
            .map(|raw_nano_units| Self { raw_nano_units })
            .ok_or(CreditError::Overflow)
    }

    /// Construye un monto directamente desde unidades crudas nano-dólar.
    #[must_use]
    pub const fn from_raw(raw_nano_units: i64) -> Self {
        Self { raw_nano_units }
    }

    /**
     * Parsea un literal decimal exacto ("12.34", "-0.005", "7").
     *
     * # Logic:
     * Descomposición manual signo/entero/fracción sin tránsito por punto
     * flotante. Se aceptan hasta 9 dígitos fraccionales (precisión nano);
     * más precisión se rechaza como literal malformado, nunca se trunca.
     *
     * # Errors:
     * - `CreditError::MalformedDecimal`: caracteres inválidos, fracción
     *   excesiva o literal vacío.
     * - `CreditError::Overflow`: magnitud fuera del rango i64 crudo.
     */
    pub fn from_dollars(decimal_literal: &str) -> Result<Self, CreditError> {
        let trimmed_literal = decimal_literal.trim();
        if trimmed_literal.is_empty() {
            return Err(CreditError::MalformedDecimal("EMPTY_LITERAL".into()));
        }

        let (is_negative, unsigned_literal) = match trimmed_literal.as_bytes()[0] {
            b'-' => (true, &trimmed_literal[1..]),
            b'+' => (false, &trimmed_literal[1..]),
            _ => (false, trimmed_literal),
        };

        if unsigned_literal.is_empty() {
            return Err(CreditError::MalformedDecimal(trimmed_literal.into()));
        }

        let mut literal_segments = unsigned_literal.splitn(2, '.');
        let integer_segment = literal_segments.next().unwrap_or("");
        let fractional_segment = literal_segments.next().unwrap_or("");

        if integer_segment.is_empty() && fractional_segment.is_empty() {
            return Err(CreditError::MalformedDecimal(trimmed_literal.into()));
        }

        if fractional_segment.len() > MAXIMUM_FRACTIONAL_DIGITS {
            return Err(CreditError::MalformedDecimal(format!(
                "FRACTIONAL_PRECISION_EXCEEDED: {} digits", fractional_segment.len()
            )));
        }

        let digits_are_valid = integer_segment.bytes().all(|b| b.is_ascii_digit())
            && fractional_segment.bytes().all(|b| b.is_ascii_digit());
        if !digits_are_valid {
            return Err(CreditError::MalformedDecimal(trimmed_literal.into()));
        }

        let integer_dollars: i64 = if integer_segment.is_empty() {
            0
        } else {
            integer_segment.parse().map_err(|_| CreditError::Overflow)?
        };

        // Normalización de la fracción a exactamente 9 dígitos nano.
        let mut fractional_nano_units: i64 = 0;
        for fractional_digit in fractional_segment.bytes() {
            fractional_nano_units = fractional_nano_units * 10 + i64::from(fractional_digit - b'0');
        }
        for _ in fractional_segment.len()..MAXIMUM_FRACTIONAL_DIGITS {
            fractional_nano_units *= 10;
        }

        let unsigned_raw = integer_dollars
            .checked_mul(RAW_UNITS_PER_DOLLAR)
            .and_then(|dollars_raw| dollars_raw.checked_add(fractional_nano_units))
            .ok_or(CreditError::Overflow)?;

        let raw_nano_units = if is_negative { -unsigned_raw } else { unsigned_raw };
        Ok(Self { raw_nano_units })
    }

    /// Expone el conteo crudo para la persistencia relacional (i64 sin pérdida).
    #[must_use]
    pub const fn raw(&self) -> i64 {
        self.raw_nano_units
    }

    /**
     * Convierte a centavos enteros, redondeando half-away-from-zero cuando
     * el monto no es un número entero de centavos (solo reporting; el
     * almacenamiento permanece crudo).
     */
    #[must_use]
    pub fn to_cents(&self) -> i64 {
        divide_rounding_half_away_from_zero(i128::from(self.raw_nano_units), i128::from(RAW_UNITS_PER_CENT)) as i64
    }

    /// Suma cerrada con detección de overflow.
    pub fn add(&self, other: CreditAmount) -> Result<CreditAmount, CreditError> {
        self.raw_nano_units
            .checked_add(other.raw_nano_units)
            .map(Self::from_raw)
            .ok_or(CreditError::Overflow)
    }

    /// Resta cerrada con detección de overflow.
    pub fn subtract(&self, other: CreditAmount) -> Result<CreditAmount, CreditError> {
        self.raw_nano_units
            .checked_sub(other.raw_nano_units)
            .map(Self::from_raw)
            .ok_or(CreditError::Overflow)
    }

    /// Multiplicación por escalar entero (conteos de asientos, meses).
    pub fn multiply_by_scalar(&self, scalar_factor: i64) -> Result<CreditAmount, CreditError> {
        self.raw_nano_units
            .checked_mul(scalar_factor)
            .map(Self::from_raw)
            .ok_or(CreditError::Overflow)
    }

    /// Negación exacta del monto.
    #[must_use]
    pub const fn negated(&self) -> CreditAmount {
        Self { raw_nano_units: -self.raw_nano_units }
    }

    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.raw_nano_units == 0
    }

    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.raw_nano_units < 0
    }

    #[must_use]
    pub const fn is_positive(&self) -> bool {
        self.raw_nano_units > 0
    }

    #[must_use]
    pub fn greater_than(&self, other: CreditAmount) -> bool {
        self.raw_nano_units > other.raw_nano_units
    }

    #[must_use]
    pub fn less_than(&self, other: CreditAmount) -> bool {
        self.raw_nano_units < other.raw_nano_units
    }

    /**
     * Representación humana "$12.34" (precisión de centavos, signo delante).
     */
    #[must_use]
    pub fn to_display_string(&self) -> String {
        let total_cents = self.to_cents();
        let sign_prefix = if total_cents < 0 { "-" } else { "" };
        let absolute_cents = total_cents.unsigned_abs();
        format!("{}${}.{:02}", sign_prefix, absolute_cents / 100, absolute_cents % 100)
    }
}

/**
 * Multiplicador de margen expresado en puntos base enteros.
 *
 * 10_000 puntos = 1.0x. El rango operativo [1.0, 3.0] se impone al cargar
 * la configuración; un multiplicador fuera de rango jamás entra al sistema.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarginMultiplier {
    basis_points: i64,
}

impl MarginMultiplier {
    /// Margen identidad (1.0x): el cargo iguala el costo mayorista.
    pub const IDENTITY: MarginMultiplier = MarginMultiplier { basis_points: MARGIN_BASIS_POINTS_SCALE };

    /**
     * Parsea un literal de margen ("1.5", "2.0") validando el rango [1.0, 3.0].
     *
     * # Errors:
     * - `CreditError::MarginOutOfBounds`: el valor cae fuera del rango
     *   operativo permitido.
     * - `CreditError::MalformedDecimal`: el literal no es un decimal con
     *   hasta 4 dígitos fraccionales.
     */
    pub fn parse(margin_literal: &str) -> Result<Self, CreditError> {
        let trimmed_literal = margin_literal.trim();
        let mut literal_segments = trimmed_literal.splitn(2, '.');
        let integer_segment = literal_segments.next().unwrap_or("");
        let fractional_segment = literal_segments.next().unwrap_or("");

        let digits_are_valid = !integer_segment.is_empty()
            && integer_segment.bytes().all(|b| b.is_ascii_digit())
            && fractional_segment.bytes().all(|b| b.is_ascii_digit())
            && fractional_segment.len() <= 4;
        if !digits_are_valid {
            return Err(CreditError::MalformedDecimal(trimmed_literal.into()));
        }

        let integer_value: i64 = integer_segment.parse().map_err(|_| CreditError::Overflow)?;

        let mut fractional_basis_points: i64 = 0;
        for fractional_digit in fractional_segment.bytes() {
            fractional_basis_points = fractional_basis_points * 10 + i64::from(fractional_digit - b'0');
        }
        for _ in fractional_segment.len()..4 {
            fractional_basis_points *= 10;
        }

        let basis_points = integer_value
            .checked_mul(MARGIN_BASIS_POINTS_SCALE)
            .and_then(|scaled_value| scaled_value.checked_add(fractional_basis_points))
            .ok_or(CreditError::Overflow)?;
        Self::from_basis_points(basis_points)
    }

    /// Construye desde puntos base validando el rango operativo.
    pub fn from_basis_points(basis_points: i64) -> Result<Self, CreditError> {
        if !(MARGIN_BASIS_POINTS_SCALE..=3 * MARGIN_BASIS_POINTS_SCALE).contains(&basis_points) {
            return Err(CreditError::MarginOutOfBounds(format!("{basis_points}bp")));
        }
        Ok(Self { basis_points })
    }

    #[must_use]
    pub const fn basis_points(&self) -> i64 {
        self.basis_points
    }

    /**
     * Calcula el cargo al tenant en centavos enteros a partir del costo
     * mayorista.
     *
     * # Mathematical Proof (Single Rounding Point):
     * charge_cents = round_half_away(cost_raw · basis_points,
     * SCALE · RAW_UNITS_PER_CENT), sellado en aritmética i128. Este es el
     * único punto del sistema donde un intermedio racional colapsa a un
     * entero; todo lo demás es exacto.
     */
    #[must_use]
    pub fn charge_cents(&self, wholesale_cost: CreditAmount) -> i64 {
        let numerator = i128::from(wholesale_cost.raw()) * i128::from(self.basis_points);
        let denominator = i128::from(MARGIN_BASIS_POINTS_SCALE) * i128::from(RAW_UNITS_PER_CENT);
        divide_rounding_half_away_from_zero(numerator, denominator) as i64
    }
}

/// División entera con redondeo half-away-from-zero en i128.
fn divide_rounding_half_away_from_zero(numerator: i128, denominator: i128) -> i128 {
    debug_assert!(denominator > 0);
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if remainder.abs() * 2 >= denominator {
        quotient + numerator.signum()
    } else {
        quotient
    }
}
