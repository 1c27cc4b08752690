//! Common Air Quality Index (CAQI) from hourly particulate averages.

/// Index bands shared by both pollutants
const INDEX_BANDS: [(u32, u32); 5] = [(0, 25), (26, 50), (51, 75), (76, 100), (101, 1000)];

/// PM2.5 concentration bands, µg/m³
const PM2_5_BANDS: [(u32, u32); 5] = [(0, 15), (16, 30), (31, 55), (56, 110), (111, 2160)];

/// PM10 concentration bands, µg/m³
const PM10_BANDS: [(u32, u32); 5] = [(0, 25), (26, 50), (51, 90), (91, 180), (181, 3240)];

/// Highest index value; concentrations above the top band clamp here
pub const MAX_INDEX: u32 = INDEX_BANDS[INDEX_BANDS.len() - 1].1;

fn sub_index(bands: &[(u32, u32); 5], value: u32) -> u32 {
    for (band, &(c_low, c_high)) in bands.iter().enumerate() {
        if value <= c_high {
            let (i_low, i_high) = INDEX_BANDS[band];
            let offset = value.saturating_sub(c_low);
            return i_low + (i_high - i_low) * offset / (c_high - c_low);
        }
    }
    MAX_INDEX
}

/// PM2.5 sub-index
pub fn pm2_5_index(pm2_5: u32) -> u32 {
    sub_index(&PM2_5_BANDS, pm2_5)
}

/// PM10 sub-index
pub fn pm10_index(pm10: u32) -> u32 {
    sub_index(&PM10_BANDS, pm10)
}

/// Overall index: the worse of the two sub-indices
pub fn caqi(pm2_5: u32, pm10: u32) -> u32 {
    pm2_5_index(pm2_5).max(pm10_index(pm10))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_air() {
        assert_eq!(caqi(0, 0), 0);
    }

    #[test]
    fn test_worse_pollutant_wins() {
        // PM2.5=10 -> 16, PM10=20 -> 20
        assert_eq!(pm2_5_index(10), 16);
        assert_eq!(pm10_index(20), 20);
        assert_eq!(caqi(10, 20), 20);
        assert_eq!(caqi(40, 20), pm2_5_index(40));
    }

    #[test]
    fn test_band_edges() {
        assert_eq!(pm2_5_index(15), 25);
        assert_eq!(pm2_5_index(16), 26);
        assert_eq!(pm2_5_index(30), 50);
        assert_eq!(pm10_index(90), 75);
        assert_eq!(pm10_index(91), 76);
        assert_eq!(pm10_index(180), 100);
    }

    #[test]
    fn test_interpolates_inside_band() {
        // Midpoint of PM10 band 51..90 maps near the middle of 51..75
        let idx = pm10_index(70);
        assert!((62..=64).contains(&idx), "got {}", idx);
    }

    #[test]
    fn test_clamps_above_top_band() {
        assert_eq!(pm2_5_index(2160), MAX_INDEX);
        assert_eq!(pm2_5_index(5000), MAX_INDEX);
        assert_eq!(caqi(0, u32::MAX), MAX_INDEX);
    }

    #[test]
    fn test_monotonic() {
        let mut last = 0;
        for pm in 0..=400 {
            let idx = caqi(pm, pm);
            assert!(idx >= last, "index dropped at {}", pm);
            last = idx;
        }
    }
}
