use std::borrow::BorrowMut;
use std::hash::Hash;
use std::path::Path;

use aya::Pod;
use aya::maps::{HashMap, Map, MapData, MapError};

use crate::{Error, Result};

/// Pin names of the datapath maps under the bpf fs.
pub const VRF_MAP_PIN: &str = "srv6_vrf_v4";
pub const POLICY_MAP_PIN: &str = "srv6_policy_v4";
pub const SID_MAP_PIN: &str = "srv6_sid";

pub trait BpfMap<K, V> {
    fn update(&mut self, key: K, value: V) -> Result<()>;
    fn delete(&mut self, key: &K) -> Result<()>;
    fn get(&self, key: &K) -> Result<V>;
    fn get_state(&self) -> Result<ahash::HashMap<K, V>>;
}

impl<T: BorrowMut<MapData>, K: Pod + Eq + Hash, V: Pod> BpfMap<K, V> for HashMap<T, K, V> {
    fn update(&mut self, key: K, value: V) -> Result<()> {
        Ok(self.insert(key, value, 0)?)
    }
    fn delete(&mut self, key: &K) -> Result<()> {
        Ok(self.remove(key)?)
    }
    fn get(&self, key: &K) -> Result<V> {
        match <HashMap<T, K, V>>::get(self, key, 0) {
            Ok(value) => Ok(value),
            Err(MapError::KeyNotFound) => Err(Error::KeyNotExist),
            Err(e) => Err(e.into()),
        }
    }
    fn get_state(&self) -> Result<ahash::HashMap<K, V>> {
        let mut map = ahash::HashMap::default();
        for kv in self.iter() {
            match kv {
                Ok((k, v)) => {
                    map.insert(k, v);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(map)
    }
}

impl<K: Eq + Hash + Clone, V: Clone> BpfMap<K, V> for ahash::HashMap<K, V> {
    fn update(&mut self, key: K, value: V) -> Result<()> {
        self.insert(key, value);
        Ok(())
    }
    fn delete(&mut self, key: &K) -> Result<()> {
        self.remove(key);
        Ok(())
    }
    fn get(&self, key: &K) -> Result<V> {
        <ahash::HashMap<K, V>>::get(self, key)
            .cloned()
            .ok_or(Error::KeyNotExist)
    }
    fn get_state(&self) -> Result<ahash::HashMap<K, V>> {
        Ok(self.clone())
    }
}

/// Open a map the datapath loader pinned under the bpf fs.
pub fn open_pinned_map<K: Pod + Eq + Hash, V: Pod>(
    bpf_fs: &Path,
    name: &str,
) -> Result<HashMap<MapData, K, V>> {
    let data = MapData::from_pin(bpf_fs.join(name))?;
    let map = Map::HashMap(data);
    Ok(map.try_into()?)
}
