use crate::api::{AppError, AppResult};
use crate::db::Showtime;

/// Cálculo de precio de una reserva
///
/// Función pura: mismas entradas, mismo resultado. Todo en céntimos.
#[derive(Debug, Clone, Copy)]
pub struct PriceCalculator {
    promotion_percent_off: u32,
}

impl PriceCalculator {
    pub fn new(promotion_percent_off: u32) -> Self {
        Self {
            promotion_percent_off: promotion_percent_off.min(100),
        }
    }

    /// `(base_price + price_adjustment) * seat_count`, con el descuento de
    /// promoción aplicado si la sesión lo tiene (redondeo al céntimo, mitad hacia arriba).
    pub fn price(&self, showtime: &Showtime, seat_count: usize) -> AppResult<i64> {
        let unit = showtime
            .base_price
            .checked_add(showtime.price_adjustment)
            .ok_or_else(|| AppError::validation_field("price_adjustment", "Importe fuera de rango"))?;
        if unit < 0 {
            return Err(AppError::validation_field(
                "price_adjustment",
                "el precio unitario no puede ser negativo",
            ));
        }

        let gross = i64::try_from(seat_count)
            .ok()
            .and_then(|count| unit.checked_mul(count))
            .ok_or_else(|| AppError::Validation("Importe fuera de rango".to_string()))?;

        if !showtime.is_promotion {
            return Ok(gross);
        }

        let keep = i64::from(100 - self.promotion_percent_off);
        gross
            .checked_mul(keep)
            .map(|scaled| (scaled + 50) / 100)
            .ok_or_else(|| AppError::Validation("Importe fuera de rango".to_string()))
    }
}

impl Default for PriceCalculator {
    fn default() -> Self {
        Self::new(20)
    }
}
