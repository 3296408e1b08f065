use crate::browser::{BrowserError, BrowserPage};
use rand::Rng;
use std::time::Duration;
use tracing::{debug, info};

/// Screen the synthetic cursor roams over.
pub const SCREEN: (f64, f64) = (1920.0, 1080.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intensity {
    Light,
    Medium,
    Heavy,
}

impl Intensity {
    /// (mouse movements, scrolls, idle pauses)
    pub fn pattern(self) -> (u32, u32, u32) {
        match self {
            Intensity::Light => (2, 1, 2),
            Intensity::Medium => (4, 2, 3),
            Intensity::Heavy => (6, 3, 4),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BrowseOptions {
    pub intensity: Intensity,
    pub duration_ms: (u64, u64),
    pub scroll: bool,
    pub cursor: bool,
}

impl BrowseOptions {
    pub fn new(intensity: Intensity, min_ms: u64, max_ms: u64) -> Self {
        Self { intensity, duration_ms: (min_ms, max_ms), scroll: true, cursor: true }
    }

    pub fn without_cursor(mut self) -> Self {
        self.cursor = false;
        self
    }

    pub fn without_scroll(mut self) -> Self {
        self.scroll = false;
        self
    }
}

fn rand_between(min: f64, max: f64) -> f64 {
    if max <= min {
        return min;
    }
    rand::thread_rng().gen_range(min..max)
}

/// Interpolated cursor path with a little jitter on every step.
pub fn mouse_path<R: Rng + ?Sized>(from: (f64, f64), to: (f64, f64), steps: u32, rng: &mut R) -> Vec<(f64, f64)> {
    let steps = steps.max(1);
    let dx = (to.0 - from.0) / steps as f64;
    let dy = (to.1 - from.1) / steps as f64;
    (0..=steps)
        .map(|i| {
            let jitter_x = if i == steps { 0.0 } else { rng.gen_range(-1.0..1.0) };
            let jitter_y = if i == steps { 0.0 } else { rng.gen_range(-1.0..1.0) };
            (from.0 + dx * i as f64 + jitter_x, from.1 + dy * i as f64 + jitter_y)
        })
        .collect()
}

/// Paced mouse, scroll and click actions. `scale` multiplies every pause;
/// zero makes the whole thing instant.
#[derive(Debug, Clone, Copy)]
pub struct HumanBehavior {
    scale: f64,
}

impl Default for HumanBehavior {
    fn default() -> Self {
        Self { scale: 1.0 }
    }
}

impl HumanBehavior {
    pub fn new(scale: f64) -> Self {
        Self { scale: scale.max(0.0) }
    }

    pub fn instant() -> Self {
        Self { scale: 0.0 }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub async fn pause(&self, min_ms: u64, max_ms: u64) {
        if self.scale == 0.0 {
            return;
        }
        let ms = rand_between(min_ms as f64, max_ms as f64) * self.scale;
        tokio::time::sleep(Duration::from_millis(ms as u64)).await;
    }

    pub async fn move_mouse(&self, page: &mut dyn BrowserPage, from: (f64, f64), to: (f64, f64)) -> Result<(), BrowserError> {
        let path = mouse_path(from, to, 20, &mut rand::thread_rng());
        for (x, y) in path {
            page.evaluate(&format!(
                "document.dispatchEvent(new MouseEvent('mousemove', {{clientX: {x:.1}, clientY: {y:.1}, bubbles: true}}))"
            ))
            .await?;
            self.pause(20, 50).await;
        }
        Ok(())
    }

    pub async fn scroll(&self, page: &mut dyn BrowserPage, delta: f64) -> Result<(), BrowserError> {
        self.pause(100, 300).await;
        page.evaluate(&format!("window.scrollBy({{top: {delta:.0}, behavior: 'smooth'}})")).await?;
        self.pause(500, 1000).await;
        Ok(())
    }

    /// Approaches the point from a random spot and clicks whatever sits there.
    pub async fn click_at(&self, page: &mut dyn BrowserPage, x: f64, y: f64) -> Result<bool, BrowserError> {
        let start = (rand_between(0.0, SCREEN.0), rand_between(0.0, SCREEN.1));
        self.move_mouse(page, start, (x, y)).await?;
        self.pause(100, 300).await;
        let clicked = page
            .evaluate(&format!(
                r#"(() => {{
  const el = document.elementFromPoint({x:.1}, {y:.1});
  if (!el) return false;
  for (const t of ['mousedown', 'mouseup']) el.dispatchEvent(new MouseEvent(t, {{clientX: {x:.1}, clientY: {y:.1}, bubbles: true}}));
  el.click();
  return true;
}})()"#
            ))
            .await?;
        self.pause(50, 150).await;
        Ok(clicked.as_bool().unwrap_or(false))
    }

    /// Wanders around the page. Failures are logged and ignored.
    pub async fn browse(&self, page: &mut dyn BrowserPage, opts: BrowseOptions) {
        let (moves, scrolls, pauses) = opts.intensity.pattern();
        let total_ms = rand_between(opts.duration_ms.0 as f64, opts.duration_ms.1 as f64);
        let interval = total_ms / f64::from(moves + scrolls + pauses);
        info!("🖱️ Simulating {:?} browsing for {}ms", opts.intensity, (total_ms * self.scale).round());

        if opts.cursor {
            for _ in 0..moves {
                let from = (rand_between(0.0, SCREEN.0), rand_between(0.0, SCREEN.1));
                let to = (rand_between(0.0, SCREEN.0), rand_between(0.0, SCREEN.1));
                if let Err(e) = self.move_mouse(page, from, to).await {
                    debug!("Mouse move skipped: {}", e);
                }
                self.pause((interval * 0.3) as u64, (interval * 0.7) as u64).await;
            }
        }
        if opts.scroll {
            for _ in 0..scrolls {
                let distance = rand_between(100.0, 500.0);
                let delta = if rand::thread_rng().gen_bool(0.5) { distance } else { -distance };
                if let Err(e) = self.scroll(page, delta).await {
                    debug!("Scroll skipped: {}", e);
                }
                self.pause((interval * 0.5) as u64, interval as u64).await;
            }
        }
        for _ in 0..pauses {
            self.pause((interval * 0.8) as u64, (interval * 1.2) as u64).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn path_ends_on_target() {
        let mut rng = StdRng::seed_from_u64(7);
        let path = mouse_path((0.0, 0.0), (200.0, 100.0), 20, &mut rng);
        assert_eq!(path.len(), 21);
        assert_eq!(*path.last().unwrap(), (200.0, 100.0));
        let (x, y) = path[10];
        assert!((x - 100.0).abs() <= 1.0 && (y - 50.0).abs() <= 1.0);
    }

    #[test]
    fn heavier_profiles_do_more() {
        let sum = |i: Intensity| {
            let (a, b, c) = i.pattern();
            a + b + c
        };
        assert!(sum(Intensity::Light) < sum(Intensity::Medium));
        assert!(sum(Intensity::Medium) < sum(Intensity::Heavy));
    }

    #[tokio::test(start_paused = true)]
    async fn instant_profile_never_sleeps() {
        let start = tokio::time::Instant::now();
        HumanBehavior::instant().pause(1_000, 5_000).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
