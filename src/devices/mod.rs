
// Only the Keithley 2400 family is supported.  The 2410, 2420 and 2440 take the same command set.

pub mod keithley2400;
