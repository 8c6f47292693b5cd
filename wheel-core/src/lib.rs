use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub type PrizeId = u32;

pub const CODE_PREFIX: &str = "LK-";

/// Upper bound accepted for an admin-supplied `prob`.
pub const MAX_PROB: f64 = 1e9;

pub const WISHES: &[&str] = &[
    "Happy New Year! Wishing you a smooth year ahead 🎉",
    "Good fortune all year long 🐍",
    "May everything go your way this year ✨",
    "New year, let's keep pushing together 💪",
    "May all your wishes come true 🧧",
    "Here's to a year full of surprises 🎊",
    "Luck is on your side this year 🍀",
    "New year, new energy, good things ahead 🌟",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Prize {
    pub id: PrizeId,
    pub name: String,
    pub desc: String,
    pub tier: u32,
    pub tier_name: String,
    pub color: String,
    pub visual_weight: f64,
    pub prob: f64,
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    1
}

impl Prize {
    /// Weight used by the draw; negative or non-finite values count as zero.
    pub fn weight(&self) -> f64 {
        if self.prob.is_finite() && self.prob > 0.0 {
            self.prob
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DrawRecord {
    pub nickname: String,
    pub prize_id: PrizeId,
    pub prize_name: String,
    pub tier_name: String,
    pub tier: u32,
    pub code: String,
    pub time: String,
}

/// The persisted document: every draw made so far plus the undrawn pool.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Ledger {
    pub draws: Vec<DrawRecord>,
    pub remaining: Vec<Prize>,
}

/// On-disk shape of a [`Ledger`]. Older documents may lack fields that were
/// added later, so every prize attribute except the id is optional here.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerDocument {
    #[serde(default)]
    pub draws: Vec<DrawRecord>,
    pub remaining: Option<Vec<StoredPrize>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPrize {
    pub id: PrizeId,
    pub name: Option<String>,
    pub desc: Option<String>,
    pub tier: Option<u32>,
    pub tier_name: Option<String>,
    pub color: Option<String>,
    pub visual_weight: Option<f64>,
    pub prob: Option<f64>,
    pub count: Option<u32>,
}

impl LedgerDocument {
    /// Fills in missing prize attributes from the catalog entry with the same
    /// id. Without a `remaining` list the pool is every catalog prize that no
    /// draw references.
    pub fn into_ledger(self, catalog: &Catalog) -> Ledger {
        let Some(stored) = self.remaining else {
            let remaining = catalog
                .prizes()
                .iter()
                .filter(|p| !self.draws.iter().any(|d| d.prize_id == p.id))
                .cloned()
                .collect();
            return Ledger {
                draws: self.draws,
                remaining,
            };
        };

        let remaining = stored
            .into_iter()
            .map(|stored| {
                let known = catalog.get(stored.id);
                Prize {
                    id: stored.id,
                    name: stored
                        .name
                        .or_else(|| known.map(|p| p.name.clone()))
                        .unwrap_or_default(),
                    desc: stored
                        .desc
                        .or_else(|| known.map(|p| p.desc.clone()))
                        .unwrap_or_default(),
                    tier: stored.tier.or(known.map(|p| p.tier)).unwrap_or_default(),
                    tier_name: stored
                        .tier_name
                        .or_else(|| known.map(|p| p.tier_name.clone()))
                        .unwrap_or_default(),
                    color: stored
                        .color
                        .or_else(|| known.map(|p| p.color.clone()))
                        .unwrap_or_default(),
                    visual_weight: stored
                        .visual_weight
                        .or(known.map(|p| p.visual_weight))
                        .unwrap_or(1.0),
                    prob: stored.prob.or(known.map(|p| p.prob)).unwrap_or(0.0),
                    count: stored.count.unwrap_or(1),
                }
            })
            .collect();

        Ledger {
            draws: self.draws,
            remaining,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DrawError {
    #[error("nickname required")]
    EmptyNickname,
    #[error("all prizes have been drawn")]
    SoldOut,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOutcome {
    /// A fresh draw; the prize has left the pool.
    Won { prize: Prize, record: DrawRecord },
    /// The nickname had already drawn; nothing was consumed.
    Repeat { record: DrawRecord },
}

impl Ledger {
    pub fn find_draw(&self, nickname: &str) -> Option<&DrawRecord> {
        let wanted = nickname.trim().to_lowercase();
        self.draws
            .iter()
            .find(|d| d.nickname.to_lowercase() == wanted)
    }

    pub fn is_drawn(&self, id: PrizeId) -> bool {
        !self.remaining.iter().any(|p| p.id == id)
    }

    /// Draws once for `nickname`, or returns the earlier result if that
    /// nickname (compared case-insensitively) has already drawn.
    pub fn draw<R: Rng + ?Sized>(
        &mut self,
        nickname: &str,
        time: impl Into<String>,
        rng: &mut R,
    ) -> Result<DrawOutcome, DrawError> {
        let name = nickname.trim();
        if name.is_empty() {
            return Err(DrawError::EmptyNickname);
        }

        if let Some(existing) = self.find_draw(name) {
            return Ok(DrawOutcome::Repeat {
                record: existing.clone(),
            });
        }

        let prize = draw_weighted(&mut self.remaining, rng)?;
        let code = self.unused_code(rng);
        let record = DrawRecord {
            nickname: name.to_string(),
            prize_id: prize.id,
            prize_name: prize.name.clone(),
            tier_name: prize.tier_name.clone(),
            tier: prize.tier,
            code,
            time: time.into(),
        };
        self.draws.push(record.clone());

        Ok(DrawOutcome::Won { prize, record })
    }

    /// Copies the fields carried by `updates` onto matching undrawn entries.
    /// Draw records keep their snapshot.
    pub fn apply_updates(&mut self, updates: &[PrizeUpdate]) {
        for update in updates {
            if let Some(prize) = self.remaining.iter_mut().find(|p| p.id == update.id) {
                update.apply_to(prize);
            }
        }
    }

    fn unused_code<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        loop {
            let code = generate_code(rng);
            if !self.draws.iter().any(|d| d.code == code) {
                return code;
            }
        }
    }
}

/// Removes and returns one entry of `remaining`, chosen with probability
/// proportional to its weight.
pub fn draw_weighted<R: Rng + ?Sized>(
    remaining: &mut Vec<Prize>,
    rng: &mut R,
) -> Result<Prize, DrawError> {
    let index = pick_index(remaining, rng).ok_or(DrawError::SoldOut)?;
    Ok(remaining.remove(index))
}

/// One uniform roll over the summed weight, walked in list order. A zero
/// weight can only win when every remaining weight is zero, in which case
/// the pick is uniform.
pub fn pick_index<R: Rng + ?Sized>(remaining: &[Prize], rng: &mut R) -> Option<usize> {
    if remaining.is_empty() {
        return None;
    }

    // Weights are scaled by the largest one so the total stays finite.
    let largest = remaining.iter().map(Prize::weight).fold(0.0, f64::max);
    if largest <= 0.0 {
        return Some(rng.gen_range(0..remaining.len()));
    }
    let scaled = |prize: &Prize| prize.weight() / largest;
    let total: f64 = remaining.iter().map(scaled).sum();

    let mut roll = rng.gen_range(0.0..total);
    let mut last_positive = None;
    for (index, prize) in remaining.iter().enumerate() {
        let weight = scaled(prize);
        if weight <= 0.0 {
            continue;
        }
        if roll < weight {
            return Some(index);
        }
        roll -= weight;
        last_positive = Some(index);
    }

    // rounding left a sliver past the final weight
    last_positive
}

/// `LK-` followed by four random bytes in upper-case hex.
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut bytes = [0u8; 4];
    rng.fill(&mut bytes);
    format!("{CODE_PREFIX}{}", hex::encode_upper(bytes))
}

pub fn random_wish<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    WISHES.choose(rng).copied().unwrap_or(WISHES[0])
}

/// The prize definitions the service draws from. Admin edits mutate it in
/// place; it is never persisted with the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    prizes: Vec<Prize>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Catalog {
    pub fn new(prizes: Vec<Prize>) -> Self {
        Self { prizes }
    }

    pub fn builtin() -> Self {
        let entry = |id, name: &str, desc: &str, tier, color: &str, prob, visual_weight| Prize {
            id,
            name: name.to_string(),
            desc: desc.to_string(),
            tier,
            tier_name: tier_label(tier).to_string(),
            color: color.to_string(),
            visual_weight,
            prob,
            count: 1,
        };

        Self::new(vec![
            entry(
                1,
                "Coffee on me ☕",
                "Any drink at the coffee shop",
                1,
                "#FFD700",
                5.0,
                1.0,
            ),
            entry(
                2,
                "Video streaming month 🎬",
                "One month of a video membership",
                1,
                "#FF6B6B",
                5.0,
                1.0,
            ),
            entry(
                3,
                "Drip coffee pack ☕",
                "A box of hand-picked drip bags",
                2,
                "#FF8E53",
                10.0,
                1.5,
            ),
            entry(
                4,
                "Snack blind box 🎁",
                "A surprise snack bundle",
                2,
                "#FFA07A",
                10.0,
                1.5,
            ),
            entry(
                5,
                "Music streaming month 🎵",
                "One month of a music membership",
                2,
                "#FF7043",
                10.0,
                1.5,
            ),
            entry(
                6,
                "Membership week pass 📺",
                "One week of a video membership",
                3,
                "#FF5252",
                20.0,
                2.0,
            ),
            entry(
                7,
                "A favour 🤝",
                "I'll take care of one small task for you",
                3,
                "#E91E63",
                20.0,
                2.0,
            ),
            entry(
                8,
                "AI tool credits 🤖",
                "Credits for an AI assistant",
                3,
                "#F44336",
                20.0,
                2.0,
            ),
        ])
    }

    pub fn prizes(&self) -> &[Prize] {
        &self.prizes
    }

    pub fn get(&self, id: PrizeId) -> Option<&Prize> {
        self.prizes.iter().find(|p| p.id == id)
    }

    /// A new ledger with no draws and an independent copy of every prize.
    pub fn fresh_ledger(&self) -> Ledger {
        Ledger {
            draws: Vec::new(),
            remaining: self.prizes.clone(),
        }
    }

    /// Applies each update to the prize with the same id. Updates naming an
    /// unknown id are dropped; the ones that matched are returned.
    pub fn apply_updates(&mut self, updates: Vec<PrizeUpdate>) -> Vec<PrizeUpdate> {
        updates
            .into_iter()
            .filter(|update| match self.prizes.iter_mut().find(|p| p.id == update.id) {
                Some(prize) => {
                    update.apply_to(prize);
                    true
                }
                None => false,
            })
            .collect()
    }
}

fn tier_label(tier: u32) -> &'static str {
    match tier {
        1 => "First prize",
        2 => "Second prize",
        _ => "Third prize",
    }
}

/// A partial prize edit. Every field present here has already been validated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrizeUpdate {
    pub id: PrizeId,
    pub prob: Option<f64>,
    pub visual_weight: Option<f64>,
    pub name: Option<String>,
    pub desc: Option<String>,
    pub tier_name: Option<String>,
    pub tier: Option<u32>,
    pub color: Option<String>,
}

impl PrizeUpdate {
    /// Reads one admin edit entry. Returns `None` without a usable numeric
    /// `id`; any other field that is missing or invalid is left unset.
    pub fn from_json(value: &Value) -> Option<Self> {
        let id = value
            .get("id")
            .and_then(Value::as_u64)
            .and_then(|id| PrizeId::try_from(id).ok())?;

        let number = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_f64)
                .filter(|n| n.is_finite())
        };
        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Some(Self {
            id,
            prob: number("prob").filter(|p| (0.0..=MAX_PROB).contains(p)),
            visual_weight: number("visualWeight").filter(|w| *w > 0.0),
            name: text("name"),
            desc: text("desc"),
            tier_name: text("tierName"),
            tier: value
                .get("tier")
                .and_then(Value::as_u64)
                .filter(|t| *t >= 1)
                .and_then(|t| u32::try_from(t).ok()),
            color: value
                .get("color")
                .and_then(Value::as_str)
                .filter(|c| is_hex_color(c))
                .map(str::to_string),
        })
    }

    pub fn apply_to(&self, prize: &mut Prize) {
        if let Some(prob) = self.prob {
            prize.prob = prob;
        }
        if let Some(weight) = self.visual_weight {
            prize.visual_weight = weight;
        }
        if let Some(name) = &self.name {
            prize.name = name.clone();
        }
        if let Some(desc) = &self.desc {
            prize.desc = desc.clone();
        }
        if let Some(tier_name) = &self.tier_name {
            prize.tier_name = tier_name.clone();
        }
        if let Some(tier) = self.tier {
            prize.tier = tier;
        }
        if let Some(color) = &self.color {
            prize.color = color.clone();
        }
    }
}

fn is_hex_color(color: &str) -> bool {
    color
        .strip_prefix('#')
        .map(|hex| hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}
