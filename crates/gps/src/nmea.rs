use proto::{Axis, Coordinate, NavigationFix, Rational};

/// Longest sentence allowed by NMEA 0183, including `$` and checksum.
const MAX_SENTENCE_LEN: usize = 82;
/// More digits than this cannot be held in an i64 with its scale.
const MAX_DIGITS: usize = 18;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Sentence {
    /// Recommended minimum navigation data.
    Rmc {
        latitude: Rational,
        longitude: Rational,
        speed: Rational,
        course: Rational,
    },
    /// Fix data.
    Gga {
        latitude: Rational,
        longitude: Rational,
        altitude: Rational,
    },
}

impl Sentence {
    /// Merges this sentence into the previous fix. Fields the sentence does
    /// not carry keep their old values.
    pub fn apply_to(&self, previous: Option<NavigationFix>) -> NavigationFix {
        match *self {
            Sentence::Rmc {
                latitude,
                longitude,
                speed,
                course,
            } => {
                let mut fix = merge_position(previous, latitude, longitude);
                fix.speed = speed;
                fix.course = course;
                fix
            }
            Sentence::Gga {
                latitude,
                longitude,
                altitude,
            } => {
                let mut fix = merge_position(previous, latitude, longitude);
                fix.altitude = altitude;
                fix
            }
        }
    }
}

fn merge_position(
    previous: Option<NavigationFix>,
    latitude: Rational,
    longitude: Rational,
) -> NavigationFix {
    let latitude = Coordinate::from_raw(Axis::Latitude, latitude);
    let longitude = Coordinate::from_raw(Axis::Longitude, longitude);
    match previous {
        Some(mut fix) => {
            fix.latitude = latitude;
            fix.longitude = longitude;
            fix
        }
        None => NavigationFix::at(latitude, longitude),
    }
}

/// Decodes one line. Anything unrecognised, malformed, or carrying no
/// position yields `None`.
pub fn parse(line: &[u8]) -> Option<Sentence> {
    let line = std::str::from_utf8(line).ok()?;
    let line = line.trim_end_matches(|c| c == '\r' || c == '\n');
    if line.len() > MAX_SENTENCE_LEN || !line.is_ascii() {
        return None;
    }
    let body = line.strip_prefix('$')?;

    let payload = match body.split_once('*') {
        Some((payload, checksum)) => {
            if checksum.len() != 2 {
                return None;
            }
            let expected = u8::from_str_radix(checksum, 16).ok()?;
            if xor_checksum(payload) != expected {
                return None;
            }
            payload
        }
        None => body,
    };

    let fields: Vec<&str> = payload.split(',').collect();
    let address = fields[0];
    if address.len() != 5 {
        return None;
    }

    match &address[2..] {
        "RMC" => parse_rmc(&fields),
        "GGA" => parse_gga(&fields),
        _ => None,
    }
}

fn parse_rmc(fields: &[&str]) -> Option<Sentence> {
    if fields.len() < 10 || fields[2] != "A" {
        return None;
    }
    Some(Sentence::Rmc {
        latitude: parse_coordinate(fields[3], fields[4], 'N', 'S')?,
        longitude: parse_coordinate(fields[5], fields[6], 'E', 'W')?,
        speed: parse_optional(fields[7])?,
        course: parse_optional(fields[8])?,
    })
}

fn parse_gga(fields: &[&str]) -> Option<Sentence> {
    if fields.len() < 11 {
        return None;
    }
    let quality: u8 = fields[6].parse().ok()?;
    if quality == 0 {
        return None;
    }
    Some(Sentence::Gga {
        latitude: parse_coordinate(fields[2], fields[3], 'N', 'S')?,
        longitude: parse_coordinate(fields[4], fields[5], 'E', 'W')?,
        altitude: parse_optional(fields[9])?,
    })
}

fn xor_checksum(payload: &str) -> u8 {
    payload.bytes().fold(0, |acc, b| acc ^ b)
}

fn parse_coordinate(value: &str, side: &str, positive: char, negative: char) -> Option<Rational> {
    let raw = parse_decimal(value)?;
    // degrees are split off at scale * 100
    if raw.scale.checked_mul(100).is_none() {
        return None;
    }
    let mut side = side.chars();
    let sign = match (side.next(), side.next()) {
        (Some(c), None) if c == positive => 1,
        (Some(c), None) if c == negative => -1,
        _ => return None,
    };
    Rational::new(sign * raw.value, raw.scale)
}

/// Empty means "not reported" and decodes to zero.
fn parse_optional(field: &str) -> Option<Rational> {
    if field.is_empty() {
        Some(Rational::ZERO)
    } else {
        parse_decimal(field)
    }
}

/// `[-+]digits[.digits]` to `value / 10^fraction_digits`.
pub fn parse_decimal(field: &str) -> Option<Rational> {
    let (negative, unsigned) = match field.as_bytes().first()? {
        b'-' => (true, &field[1..]),
        b'+' => (false, &field[1..]),
        _ => (false, field),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if int_part.len() + frac_part.len() > MAX_DIGITS {
        return None;
    }

    let mut value: i64 = 0;
    let mut scale: i64 = 1;
    for b in int_part.bytes() {
        value = value * 10 + digit(b)?;
    }
    for b in frac_part.bytes() {
        value = value * 10 + digit(b)?;
        scale *= 10;
    }
    Rational::new(if negative { -value } else { value }, scale)
}

fn digit(b: u8) -> Option<i64> {
    b.is_ascii_digit().then(|| i64::from(b - b'0'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proto::Hemisphere;

    const RMC: &[u8] = b"$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A\r\n";
    const GGA: &[u8] = b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";

    fn r(value: i64, scale: i64) -> Rational {
        Rational::new(value, scale).unwrap()
    }

    #[test]
    fn decodes_rmc() {
        assert_eq!(
            parse(RMC),
            Some(Sentence::Rmc {
                latitude: r(4807038, 1000),
                longitude: r(1131000, 1000),
                speed: r(224, 10),
                course: r(844, 10),
            })
        );
    }

    #[test]
    fn decodes_gga_with_other_talker_and_southwest() {
        assert_eq!(parse(GGA).map(|s| matches!(s, Sentence::Gga { .. })), Some(true));

        let line = b"$GPGGA,083559.00,3352.345,S,15112.500,W,1,08,0.9,-12.5,M,46.9,M,,*76";
        assert_eq!(
            parse(line),
            Some(Sentence::Gga {
                latitude: r(-3352345, 1000),
                longitude: r(-15112500, 1000),
                altitude: r(-125, 10),
            })
        );

        let line = b"$GNRMC,083559.00,A,3352.345,S,15112.500,W,0.004,,090922,,,A*61\n";
        match parse(line) {
            Some(Sentence::Rmc { speed, course, .. }) => {
                assert_eq!(speed, r(4, 1000));
                assert_eq!(course, Rational::ZERO);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn drops_bad_checksum_unknown_and_void() {
        let corrupted = b"$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6B";
        assert_eq!(parse(corrupted), None);
        assert_eq!(parse(b"$GPGSV,2,1,08,01,40,083,46*4E"), None);
        assert_eq!(parse(b"$GPRMC,083559.00,V,,,,,,,090922,,,N*7F"), None);
        assert_eq!(parse(b"$GPGGA,123520,4807.100,N,01131.100,E,0,00,,,M,,M,,*53"), None);
        assert_eq!(parse(b"GPRMC,123519,A"), None);
        assert_eq!(parse(b"$GPRMC,123519,A,48x7.038,N,01131.000,E,,,230394,,"), None);
        assert_eq!(parse(&[0xff, 0xfe, b'\n']), None);
    }

    #[test]
    fn drops_coordinate_with_oversized_fraction() {
        let line = b"$GPRMC,1,A,.00000000000000001,N,01131.000,E,,,230394,,\r\n";
        assert_eq!(parse(line), None);
        let line = b"$GPGGA,1,4807.038,N,.00000000000000001,E,1,08,0.9,545.4,M,46.9,M,,";
        assert_eq!(parse(line), None);
        // still fine a few digits short of the limit
        let line = b"$GPRMC,1,A,4807.0380000000,N,01131.000,E,,,230394,,";
        assert!(parse(line).is_some());
    }

    #[test]
    fn checksum_is_optional() {
        let line = b"$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W";
        assert!(parse(line).is_some());
    }

    #[test]
    fn decimals() {
        assert_eq!(parse_decimal("545.4"), Some(r(5454, 10)));
        assert_eq!(parse_decimal("-0.25"), Some(r(-25, 100)));
        assert_eq!(parse_decimal("08"), Some(r(8, 1)));
        assert_eq!(parse_decimal("."), None);
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("1.2.3"), None);
    }

    #[test]
    fn sentences_merge_into_one_fix() {
        let rmc = parse(RMC).unwrap();
        let gga = parse(GGA).unwrap();

        let fix = rmc.apply_to(None);
        assert_eq!(fix.altitude, Rational::ZERO);
        assert_eq!(fix.latitude.hemisphere, Hemisphere::North);
        assert_eq!(fix.longitude.hemisphere, Hemisphere::East);

        let fix = gga.apply_to(Some(fix));
        assert_eq!(fix.altitude, r(5454, 10));
        assert_eq!(fix.speed, r(224, 10));
        assert_eq!(fix.course, r(844, 10));
        assert_eq!(fix.latitude.degrees, 48);
        assert_eq!(fix.latitude.minutes_scaled, 7038);
        assert_eq!(fix.longitude.degrees, 11);
        assert_eq!(fix.longitude.minutes_scaled, 31000);
    }
}
