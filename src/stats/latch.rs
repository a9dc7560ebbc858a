use serde::{Deserialize, Serialize};

/// Порог, ниже которого битрейт считается неопределённым
pub const BITRATE_EPSILON_MBPS: f64 = 1e-6;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Посчитано в этом цикле
    Fresh,
    /// Перенесено из последнего свежего значения
    Latched,
}

/// Значение метрики вместе с происхождением
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Reading<T> {
    pub value: T,
    pub provenance: Provenance,
}

impl<T> Reading<T> {
    pub fn fresh(value: T) -> Self {
        Self {
            value,
            provenance: Provenance::Fresh,
        }
    }

    pub fn latched(value: T) -> Self {
        Self {
            value,
            provenance: Provenance::Latched,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.provenance == Provenance::Fresh
    }
}

/// Ячейка "последнее хорошее значение" для одного поля
#[derive(Debug, Clone, Default)]
pub struct Latch<T> {
    last: Option<T>,
}

impl<T: Copy + Default> Latch<T> {
    pub fn new() -> Self {
        Self { last: None }
    }

    pub fn last(&self) -> Option<T> {
        self.last
    }

    /// Свежий сэмпл обновляет ячейку, отсутствующий отдаёт прошлое значение
    pub fn observe(&mut self, sample: Option<T>) -> Reading<T> {
        match sample {
            Some(value) => {
                self.last = Some(value);
                Reading::fresh(value)
            }
            None => Reading::latched(self.last.unwrap_or_default()),
        }
    }
}

/// Битрейт по накопительному счётчику байт и его отметке времени.
///
/// `None` в значении означает "не определён" (NAN в логах).
#[derive(Debug, Clone, Default)]
pub struct RateLatch {
    baseline: Option<(f64, f64)>,
    last: Option<f64>,
}

impl RateLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<f64> {
        self.last
    }

    /// `bytes` накопительный, `timestamp_ms` в миллисекундах
    pub fn observe(&mut self, bytes: Option<f64>, timestamp_ms: Option<f64>) -> Reading<Option<f64>> {
        let (Some(bytes), Some(timestamp_ms)) = (bytes, timestamp_ms) else {
            return Reading::latched(Some(self.last.unwrap_or(0.0)));
        };

        let seconds = timestamp_ms / 1000.0;
        let rate = self.baseline.and_then(|(prev_bytes, prev_seconds)| {
            let elapsed = (seconds - prev_seconds).abs();
            if elapsed == 0.0 {
                None
            } else {
                Some((bytes - prev_bytes).max(0.0) / elapsed * 8.0 / 1e6)
            }
        });
        self.baseline = Some((bytes, seconds));

        match rate {
            Some(mbps) if mbps >= BITRATE_EPSILON_MBPS => {
                self.last = Some(mbps);
                Reading::fresh(Some(mbps))
            }
            _ => Reading::latched(self.last),
        }
    }
}
