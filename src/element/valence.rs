use thiserror::Error;

use super::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValenceError {
    #[error("bad valence on {symbol} having {connections} drawn bonds, charge {charge}, and {radical_electrons} radical electrons")]
    BadValence {
        symbol: String,
        connections: i32,
        charge: i32,
        radical_electrons: i32,
    },
}

fn is_alkali(number: u8) -> bool {
    matches!(number, 3 | 11 | 19 | 37 | 55 | 87)
}

impl ElementTable {
    /// Normal valence of an atom and the number of implicit hydrogens it
    /// needs to reach it, given `conn` (the sum of its explicit bond orders).
    ///
    /// Elements without a rule keep `valence = conn` and no hydrogens.
    pub fn calc_valence(&self, number: u8, charge: i32, radical: Radical, conn: i32) -> Result<(i32, i32), ValenceError> {
        let rad = radical.electrons();
        let ac = charge.abs();

        let (valence, hyd) = match self.group(number) {
            1 if is_alkali(number) => (1, 1 - rad - conn - ac),
            3 if matches!(number, B | AL | GA | IN) => {
                if charge == -1 {
                    (4, 4 - rad - conn)
                } else {
                    (3, 3 - rad - conn - ac)
                }
            }
            3 if number == TL => match charge {
                -1 if rad + conn <= 2 => (2, 2 - rad - conn),
                -1 => (4, 4 - rad - conn),
                -2 if rad + conn <= 3 => (3, 3 - rad - conn),
                -2 => (5, 5 - rad - conn),
                _ if rad + conn + ac <= 1 => (1, 1 - rad - conn - ac),
                _ => (3, 3 - rad - conn - ac),
            },
            4 if matches!(number, C | SI | GE) => (4, 4 - rad - conn - ac),
            4 if matches!(number, SN | PB) => {
                if conn + rad + ac <= 2 {
                    (2, 2 - rad - conn - ac)
                } else {
                    (4, 4 - rad - conn - ac)
                }
            }
            5 if matches!(number, N | P) => match charge {
                1 => (4, 4 - rad - conn),
                2 => (3, 3 - rad - conn),
                _ if number == N || rad + conn + ac <= 3 => (3, 3 - rad - conn - ac),
                _ => (5, 5 - rad - conn - ac),
            },
            5 if matches!(number, AS | SB | BI) => match charge {
                1 if rad + conn <= 2 && number != AS => (2, 2 - rad - conn),
                1 => (4, 4 - rad - conn),
                2 => (3, 3 - rad - conn),
                _ if rad + conn <= 3 => (3, 3 - rad - conn - ac),
                _ => (5, 5 - rad - conn - ac),
            },
            6 if number == O => {
                if charge >= 1 {
                    (3, 3 - rad - conn)
                } else {
                    (2, 2 - rad - conn - ac)
                }
            }
            6 if matches!(number, S | SE | PO) => match charge {
                1 if conn <= 3 => (3, 3 - rad - conn),
                1 => (5, 5 - rad - conn),
                -1 if conn + rad <= 1 => (1, 1 - rad - conn),
                -1 if conn + rad <= 3 => (3, 3 - rad - conn),
                -1 if conn + rad <= 5 => (5, 5 - rad - conn),
                -1 => (7, 7 - rad - conn),
                _ if conn + rad + ac <= 2 => (2, 2 - rad - conn - ac),
                _ if conn + rad + ac <= 4 => (4, 4 - rad - conn - ac),
                _ => (6, 6 - rad - conn - ac),
            },
            6 if number == TE => match charge {
                -1 if conn <= 2 => (2, 2 - rad - conn - ac),
                0 | 2 if conn <= 2 => (2, 2 - rad - conn - ac),
                0 | 2 if conn <= 4 => (4, 4 - rad - conn - ac),
                0 if conn <= 6 => (6, 6 - rad - conn - ac),
                0 | 2 => (conn, -1),
                _ => (conn, 0),
            },
            7 if number == F => (1, 1 - rad - conn - ac),
            7 if matches!(number, CL | BR | I | AT) => match charge {
                1 if conn <= 2 => (2, 2 - rad - conn),
                1 if conn == 3 || conn == 5 || conn >= 7 => (conn, -1),
                0 if conn <= 1 => (1, 1 - rad - conn),
                // hypervalent halogens never carry hydrogens
                0 if conn == 2 || conn == 4 || conn == 6 => (conn, if rad == 1 { 0 } else { -1 }),
                0 if conn > 7 => (conn, -1),
                _ => (conn, 0),
            },
            _ => (conn, 0),
        };

        if hyd < 0 {
            return Err(ValenceError::BadValence {
                symbol: self.number_to_symbol(number).unwrap_or("?").to_owned(),
                connections: conn,
                charge,
                radical_electrons: rad,
            });
        }
        Ok((valence, hyd))
    }

    /// Like [`calc_valence`](Self::calc_valence) but never fails: a bad
    /// valence yields `(conn, 0)`.
    pub fn calc_valence_lenient(&self, number: u8, charge: i32, radical: Radical, conn: i32) -> (i32, i32) {
        self.calc_valence(number, charge, radical, conn).unwrap_or((conn, 0))
    }

    /// The part of an explicit valence that is not hydrogen, used to turn a
    /// stored valence into an implicit hydrogen count.
    pub fn calc_valence_minus_hyd(&self, number: u8, charge: i32, radical: Radical, conn: i32) -> i32 {
        let rad = radical.electrons();
        let ionic = match self.group(number) {
            3 if matches!(number, B | AL | GA | IN) && charge == -1 && rad + conn <= 4 => false,
            5 if matches!(number, N | P | AS | SB | BI) && (charge == 1 || charge == 2) => false,
            6 if number == O && charge >= 1 => false,
            6 if matches!(number, S | SE | PO) && (charge == 1 || charge == -1) => false,
            7 if matches!(number, CL | BR | I | AT) && charge == 1 => false,
            _ => true,
        };
        if ionic {
            rad + conn + charge.abs()
        } else {
            rad + conn
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valence(number: u8, charge: i32, conn: i32) -> Result<(i32, i32), ValenceError> {
        ELEMENTS.calc_valence(number, charge, Radical::None, conn)
    }

    #[test]
    fn test_organic_subset() {
        assert_eq!(valence(C, 0, 1), Ok((4, 3)));
        assert_eq!(valence(C, 0, 4), Ok((4, 0)));
        assert_eq!(valence(N, 0, 1), Ok((3, 2)));
        assert_eq!(valence(N, 1, 4), Ok((4, 0)));
        assert_eq!(valence(O, 0, 0), Ok((2, 2)));
        assert_eq!(valence(O, -1, 1), Ok((2, 0)));
        assert_eq!(valence(CL, 0, 1), Ok((1, 0)));
    }

    #[test]
    fn test_hypervalent() {
        assert_eq!(valence(P, 0, 5), Ok((5, 0)));
        assert_eq!(valence(S, 0, 3), Ok((4, 1)));
        assert_eq!(valence(S, 0, 6), Ok((6, 0)));
        assert_eq!(valence(S, -1, 1), Ok((1, 0)));
        assert_eq!(valence(SN, 0, 2), Ok((2, 0)));
        assert_eq!(valence(SN, 0, 3), Ok((4, 1)));
    }

    #[test]
    fn test_radical_reduces_hydrogens() {
        assert_eq!(ELEMENTS.calc_valence(C, 0, Radical::Doublet, 1), Ok((4, 2)));
        assert_eq!(ELEMENTS.calc_valence(C, 0, Radical::Triplet, 0), Ok((4, 2)));
    }

    #[test]
    fn test_bad_valence() {
        let err = valence(C, 0, 5).unwrap_err();
        assert_eq!(
            err.to_string(),
            "bad valence on C having 5 drawn bonds, charge 0, and 0 radical electrons"
        );
        assert!(valence(N, 0, 4).is_err());
        assert!(valence(CL, 0, 2).is_err());
        assert!(valence(TE, 0, 7).is_err());
        assert_eq!(ELEMENTS.calc_valence_lenient(C, 0, Radical::None, 5), (5, 0));
    }

    #[test]
    fn test_no_rule_elements() {
        // iron has no rule
        assert_eq!(valence(26, 2, 6), Ok((6, 0)));
        assert_eq!(valence(H, 0, 1), Ok((1, 0)));
    }

    #[test]
    fn test_valence_minus_hyd() {
        assert_eq!(ELEMENTS.calc_valence_minus_hyd(N, 1, Radical::None, 3), 3);
        assert_eq!(ELEMENTS.calc_valence_minus_hyd(C, -1, Radical::None, 3), 4);
    }
}
