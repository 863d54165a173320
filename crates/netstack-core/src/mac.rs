//! MAC address generation for new virtual interfaces

use std::sync::Mutex;

use uuid::Uuid;

use netstack_types::MacAddr;

/// Prefix of generated addresses; 0x02 sets the locally administered bit
pub const MAC_PREFIX: [u8; 3] = [0x02, 0x16, 0x3e];

pub trait MacAddressGenerator: Send + Sync {
    fn generate(&self) -> MacAddr;
}

/// Random locally administered unicast addresses under [`MAC_PREFIX`]
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomMacGenerator;

impl MacAddressGenerator for RandomMacGenerator {
    fn generate(&self) -> MacAddr {
        let entropy = Uuid::new_v4();
        let bytes = entropy.as_bytes();
        MacAddr::new([
            MAC_PREFIX[0],
            MAC_PREFIX[1],
            MAC_PREFIX[2],
            bytes[0] & 0x7f,
            bytes[1],
            bytes[2],
        ])
    }
}

/// Always hands out the same address
#[derive(Debug, Clone, Copy)]
pub struct FixedMacGenerator(pub MacAddr);

impl MacAddressGenerator for FixedMacGenerator {
    fn generate(&self) -> MacAddr {
        self.0
    }
}

/// Hands out a predetermined list of addresses, then repeats the last one
#[derive(Debug)]
pub struct SequenceMacGenerator {
    remaining: Mutex<Vec<MacAddr>>,
    last: MacAddr,
}

impl SequenceMacGenerator {
    pub fn new(macs: Vec<MacAddr>) -> Self {
        let last = macs.last().copied().unwrap_or(MacAddr::new([
            MAC_PREFIX[0],
            MAC_PREFIX[1],
            MAC_PREFIX[2],
            0,
            0,
            0,
        ]));
        let mut remaining = macs;
        remaining.reverse();
        Self {
            remaining: Mutex::new(remaining),
            last,
        }
    }
}

impl MacAddressGenerator for SequenceMacGenerator {
    fn generate(&self) -> MacAddr {
        match self.remaining.lock() {
            Ok(mut remaining) => remaining.pop().unwrap_or(self.last),
            Err(_) => self.last,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn random_macs_are_local_unicast() {
        let generator = RandomMacGenerator;
        for _ in 0..64 {
            let mac = generator.generate();
            assert!(mac.is_locally_administered());
            assert!(mac.is_unicast());
            assert_eq!(&mac.bytes()[..3], &MAC_PREFIX);
            assert!(mac.bytes()[3] <= 0x7f);
        }
    }

    #[test]
    fn random_macs_rarely_collide() {
        let generator = RandomMacGenerator;
        let macs: HashSet<String> = (0..256).map(|_| generator.generate().to_string()).collect();
        assert!(macs.len() > 250);
    }

    #[test]
    fn fixed_generator_is_deterministic() {
        let mac: MacAddr = "11:22:33:44:55:66".parse().unwrap();
        let generator = FixedMacGenerator(mac);
        assert_eq!(generator.generate(), mac);
        assert_eq!(generator.generate(), mac);
    }

    #[test]
    fn sequence_generator_replays_in_order() {
        let first: MacAddr = "02:16:3e:00:00:01".parse().unwrap();
        let second: MacAddr = "02:16:3e:00:00:02".parse().unwrap();
        let generator = SequenceMacGenerator::new(vec![first, second]);

        assert_eq!(generator.generate(), first);
        assert_eq!(generator.generate(), second);
        assert_eq!(generator.generate(), second);
    }
}
